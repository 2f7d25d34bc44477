//! Resource ledger: which resources each function/library pair consumes and
//! how much of every resource is still available.
//!
//! Every mutation runs inside one store transaction, so a failed allocation
//! or a cascading delete never leaves partial changes behind, and two
//! processes sharing the database never overwrite each other's updates.

pub mod aggregate;
pub mod sqlite;
pub mod store;

use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use thiserror::Error;

use admctrl_core::cost::ExprError;
use admctrl_core::limits::{MAX_FORMULA_LEN, MAX_RESOURCES, MAX_RESOURCE_DESCRIPTION};
use admctrl_core::protocol::{ResourceRequirement, Shortfall};
use admctrl_core::AdmCtrlError;

pub use sqlite::SqliteStore;
pub use store::{StoreTxn, Table, TransactionalStore};

/// Key of a consumption entry: `function_id | library_id << 16`, or the global
/// function word.
pub type ResourceKey = u32;

/// Upper half of the id word of a library-independent function.
pub const GLOBAL_MARK: u32 = 0xFFFF_0000;
/// Library id reserved for [`GLOBAL_MARK`].
pub const RESERVED_LIBRARY_ID: u16 = 0xFFFF;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    #[error("ledger database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("encoding: {0}")]
    Format(String),
    #[error("transaction already finished")]
    NoTxn,
    #[error("corrupt {table:?} record")]
    Corrupt { table: Table },
    #[error("unknown function {0}")]
    UnknownFunction(String),
    #[error("unknown library {0}")]
    UnknownLibrary(String),
    #[error("unknown resource {0:#010x}")]
    UnknownResource(ResourceKey),
    #[error("{0} already exists")]
    Exists(String),
    #[error("library id {0:#06x} is reserved")]
    ReservedId(u16),
    #[error("{0} is too long")]
    TooLong(&'static str),
    #[error("resource {key:#010x}: required {required}, available {available}")]
    Insufficient {
        index: usize,
        key: ResourceKey,
        required: u32,
        available: u32,
    },
    #[error("resource {0:#010x} amount overflows")]
    Overflow(ResourceKey),
    #[error("more than {} distinct resources", MAX_RESOURCES)]
    TooManyResources,
    #[error("cost formula of {function}/{library}: {source}")]
    Cost {
        function: String,
        library: String,
        #[source]
        source: ExprError,
    },
}

impl From<LedgerError> for AdmCtrlError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Insufficient {
                index,
                key,
                required,
                available,
            } => AdmCtrlError::ResourceCtrlFail {
                index,
                key,
                required,
                available,
            },
            other => AdmCtrlError::ResourceCtrl(other.to_string()),
        }
    }
}

/// How much of a resource one function instance consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceConsumption {
    pub resource: ResourceKey,
    pub fixed_cost: u32,
    /// printf-style template over the instance arguments; empty means none.
    pub formula: String,
}

impl ResourceConsumption {
    fn encode(&self) -> Vec<u8> {
        let mut b = BytesMut::with_capacity(8 + self.formula.len());
        b.put_u32_le(self.resource);
        b.put_u32_le(self.fixed_cost);
        b.put_slice(self.formula.as_bytes());
        b.to_vec()
    }

    fn decode(mut raw: &[u8]) -> Result<Self, LedgerError> {
        let corrupt = LedgerError::Corrupt {
            table: Table::Consumption,
        };
        if raw.remaining() < 8 {
            return Err(corrupt);
        }
        let resource = raw.get_u32_le();
        let fixed_cost = raw.get_u32_le();
        let formula = String::from_utf8(raw.to_vec()).map_err(|_| corrupt)?;
        Ok(Self {
            resource,
            fixed_cost,
            formula,
        })
    }
}

/// Ledger-resident resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resource {
    pub available: u32,
    pub description: String,
}

impl Resource {
    fn encode(&self) -> Vec<u8> {
        let mut b = BytesMut::with_capacity(4 + self.description.len());
        b.put_u32_le(self.available);
        b.put_slice(self.description.as_bytes());
        b.to_vec()
    }

    fn decode(mut raw: &[u8]) -> Result<Self, LedgerError> {
        let corrupt = LedgerError::Corrupt {
            table: Table::Resources,
        };
        if raw.remaining() < 4 {
            return Err(corrupt);
        }
        let available = raw.get_u32_le();
        let description = String::from_utf8(raw.to_vec()).map_err(|_| corrupt)?;
        Ok(Self {
            available,
            description,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionEntry {
    pub name: String,
    pub id: u16,
    pub global: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryEntry {
    pub name: String,
    pub id: u16,
}

/// Result of a read-only availability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Ok,
    Insufficient(Shortfall),
}

fn key_bytes(key: ResourceKey) -> [u8; 4] {
    key.to_be_bytes()
}

fn key_from_bytes(table: Table, raw: &[u8]) -> Result<ResourceKey, LedgerError> {
    let arr: [u8; 4] = raw.try_into().map_err(|_| LedgerError::Corrupt { table })?;
    Ok(u32::from_be_bytes(arr))
}

fn read_u32(table: Table, raw: &[u8]) -> Result<u32, LedgerError> {
    let arr: [u8; 4] = raw.try_into().map_err(|_| LedgerError::Corrupt { table })?;
    Ok(u32::from_le_bytes(arr))
}

fn read_u16(table: Table, raw: &[u8]) -> Result<u16, LedgerError> {
    let arr: [u8; 2] = raw.try_into().map_err(|_| LedgerError::Corrupt { table })?;
    Ok(u16::from_le_bytes(arr))
}

async fn load_resource<T: StoreTxn>(
    txn: &mut T,
    key: ResourceKey,
) -> Result<Option<Resource>, LedgerError> {
    txn.get(Table::Resources, &key_bytes(key))
        .await?
        .map(|raw| Resource::decode(&raw))
        .transpose()
}

/// Resource ledger over a transactional store.
#[derive(Debug, Clone)]
pub struct ResourceLedger<S> {
    store: S,
}

impl<S: TransactionalStore> ResourceLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consumption key of `function` implemented by `library`.
    ///
    /// Global functions map to their own id word and ignore the library.
    /// `None` when either name is unknown.
    pub async fn resource_key(
        &self,
        function: &str,
        library: &str,
    ) -> Result<Option<ResourceKey>, LedgerError> {
        let Some(raw) = self.store.get(Table::Functions, function.as_bytes()).await? else {
            return Ok(None);
        };
        let word = read_u32(Table::Functions, &raw)?;
        if word & GLOBAL_MARK == GLOBAL_MARK {
            return Ok(Some(word));
        }
        let Some(raw) = self.store.get(Table::Libraries, library.as_bytes()).await? else {
            return Ok(None);
        };
        let lib = read_u16(Table::Libraries, &raw)?;
        Ok(Some((word & 0xFFFF) | (u32::from(lib) << 16)))
    }

    /// Consumption records under `key`, in insertion order.
    pub async fn consumption_for(&self, key: ResourceKey) -> Result<Vec<ResourceConsumption>, LedgerError> {
        self.store
            .duplicates(Table::Consumption, &key_bytes(key))
            .await?
            .iter()
            .map(|raw| ResourceConsumption::decode(raw))
            .collect()
    }

    pub async fn resource(&self, key: ResourceKey) -> Result<Option<Resource>, LedgerError> {
        self.store
            .get(Table::Resources, &key_bytes(key))
            .await?
            .map(|raw| Resource::decode(&raw))
            .transpose()
    }

    /// First requirement the ledger cannot cover, if any. Does not modify anything.
    pub async fn check(&self, requirements: &[ResourceRequirement]) -> Result<CheckOutcome, LedgerError> {
        for (index, req) in requirements.iter().enumerate() {
            let res = self
                .resource(req.key)
                .await?
                .ok_or(LedgerError::UnknownResource(req.key))?;
            if req.required > res.available {
                return Ok(CheckOutcome::Insufficient(Shortfall {
                    index: u32::try_from(index).unwrap_or(u32::MAX),
                    key: req.key,
                    required: req.required,
                    available: res.available,
                }));
            }
        }
        Ok(CheckOutcome::Ok)
    }

    /// Subtract every requirement, all or nothing.
    pub async fn allocate(&self, requirements: &[ResourceRequirement]) -> Result<(), LedgerError> {
        let mut txn = self.store.begin().await?;
        for (index, req) in requirements.iter().enumerate() {
            let mut res = load_resource(&mut txn, req.key)
                .await?
                .ok_or(LedgerError::UnknownResource(req.key))?;
            res.available = res
                .available
                .checked_sub(req.required)
                .ok_or(LedgerError::Insufficient {
                    index,
                    key: req.key,
                    required: req.required,
                    available: res.available,
                })?;
            txn.put(Table::Resources, &key_bytes(req.key), &res.encode()).await?;
        }
        txn.commit().await?;
        tracing::debug!(resources = requirements.len(), "resources allocated");
        Ok(())
    }

    /// Give every requirement back, all or nothing.
    pub async fn deallocate(&self, requirements: &[ResourceRequirement]) -> Result<(), LedgerError> {
        let mut txn = self.store.begin().await?;
        for req in requirements {
            let mut res = load_resource(&mut txn, req.key)
                .await?
                .ok_or(LedgerError::UnknownResource(req.key))?;
            res.available = res
                .available
                .checked_add(req.required)
                .ok_or(LedgerError::Overflow(req.key))?;
            txn.put(Table::Resources, &key_bytes(req.key), &res.encode()).await?;
        }
        txn.commit().await?;
        tracing::debug!(resources = requirements.len(), "resources released");
        Ok(())
    }

    pub async fn add_function(&self, name: &str, id: u16, global: bool) -> Result<(), LedgerError> {
        let mut txn = self.store.begin().await?;
        if txn.get(Table::Functions, name.as_bytes()).await?.is_some() {
            return Err(LedgerError::Exists(format!("function {name}")));
        }
        for (_, raw) in txn.scan(Table::Functions).await? {
            if read_u32(Table::Functions, &raw)? & 0xFFFF == u32::from(id) {
                return Err(LedgerError::Exists(format!("function id {id}")));
            }
        }
        let word = u32::from(id) | if global { GLOBAL_MARK } else { 0 };
        txn.put(Table::Functions, name.as_bytes(), &word.to_le_bytes()).await?;
        txn.commit().await
    }

    pub async fn add_library(&self, name: &str, id: u16) -> Result<(), LedgerError> {
        if id == RESERVED_LIBRARY_ID {
            return Err(LedgerError::ReservedId(id));
        }
        let mut txn = self.store.begin().await?;
        if txn.get(Table::Libraries, name.as_bytes()).await?.is_some() {
            return Err(LedgerError::Exists(format!("library {name}")));
        }
        for (_, raw) in txn.scan(Table::Libraries).await? {
            if read_u16(Table::Libraries, &raw)? == id {
                return Err(LedgerError::Exists(format!("library id {id}")));
            }
        }
        txn.put(Table::Libraries, name.as_bytes(), &id.to_le_bytes()).await?;
        txn.commit().await
    }

    pub async fn add_resource(&self, key: ResourceKey, resource: &Resource) -> Result<(), LedgerError> {
        if resource.description.len() > MAX_RESOURCE_DESCRIPTION {
            return Err(LedgerError::TooLong("resource description"));
        }
        let mut txn = self.store.begin().await?;
        if load_resource(&mut txn, key).await?.is_some() {
            return Err(LedgerError::Exists(format!("resource {key:#010x}")));
        }
        txn.put(Table::Resources, &key_bytes(key), &resource.encode()).await?;
        txn.commit().await
    }

    /// Overwrite the available amount of an existing resource.
    pub async fn set_available(&self, key: ResourceKey, available: u32) -> Result<(), LedgerError> {
        let mut txn = self.store.begin().await?;
        let mut res = load_resource(&mut txn, key)
            .await?
            .ok_or(LedgerError::UnknownResource(key))?;
        res.available = available;
        txn.put(Table::Resources, &key_bytes(key), &res.encode()).await?;
        txn.commit().await
    }

    pub async fn add_consumption(
        &self,
        key: ResourceKey,
        record: &ResourceConsumption,
    ) -> Result<(), LedgerError> {
        if record.formula.len() > MAX_FORMULA_LEN {
            return Err(LedgerError::TooLong("cost formula"));
        }
        let mut txn = self.store.begin().await?;
        if load_resource(&mut txn, record.resource).await?.is_none() {
            return Err(LedgerError::UnknownResource(record.resource));
        }
        txn.put_dup(Table::Consumption, &key_bytes(key), &record.encode()).await?;
        txn.commit().await
    }

    /// Remove a function and every consumption entry keyed on its id.
    /// Returns the number of consumption keys removed.
    pub async fn del_function(&self, name: &str) -> Result<usize, LedgerError> {
        let mut txn = self.store.begin().await?;
        let raw = txn
            .get(Table::Functions, name.as_bytes())
            .await?
            .ok_or_else(|| LedgerError::UnknownFunction(name.to_string()))?;
        let fid = read_u32(Table::Functions, &raw)? & 0xFFFF;
        txn.delete(Table::Functions, name.as_bytes()).await?;
        let removed = delete_consumption_keys(&mut txn, |key| key & 0xFFFF == fid).await?;
        txn.commit().await?;
        tracing::info!(function = %name, removed, "function deleted");
        Ok(removed)
    }

    /// Remove a library and every consumption entry keyed on its id.
    pub async fn del_library(&self, name: &str) -> Result<usize, LedgerError> {
        let mut txn = self.store.begin().await?;
        let raw = txn
            .get(Table::Libraries, name.as_bytes())
            .await?
            .ok_or_else(|| LedgerError::UnknownLibrary(name.to_string()))?;
        let lid = u32::from(read_u16(Table::Libraries, &raw)?);
        txn.delete(Table::Libraries, name.as_bytes()).await?;
        let removed = delete_consumption_keys(&mut txn, |key| key >> 16 == lid).await?;
        txn.commit().await?;
        tracing::info!(library = %name, removed, "library deleted");
        Ok(removed)
    }

    /// Remove a resource and every consumption record referring to it.
    pub async fn del_resource(&self, key: ResourceKey) -> Result<usize, LedgerError> {
        let mut txn = self.store.begin().await?;
        if !txn.delete(Table::Resources, &key_bytes(key)).await? {
            return Err(LedgerError::UnknownResource(key));
        }
        let mut removed = 0;
        for pk in consumption_keys(&mut txn).await? {
            removed += drop_records_for(&mut txn, pk, key).await?;
        }
        txn.commit().await?;
        tracing::info!(resource = key, removed, "resource deleted");
        Ok(removed)
    }

    /// Remove every consumption record under `key` that refers to `resource`.
    pub async fn del_consumption(&self, key: ResourceKey, resource: ResourceKey) -> Result<usize, LedgerError> {
        let mut txn = self.store.begin().await?;
        let removed = drop_records_for(&mut txn, key, resource).await?;
        txn.commit().await?;
        Ok(removed)
    }

    pub async fn functions(&self) -> Result<Vec<FunctionEntry>, LedgerError> {
        self.store
            .scan(Table::Functions)
            .await?
            .into_iter()
            .map(|(k, v)| {
                let word = read_u32(Table::Functions, &v)?;
                Ok(FunctionEntry {
                    name: String::from_utf8_lossy(&k).into_owned(),
                    id: (word & 0xFFFF) as u16,
                    global: word & GLOBAL_MARK == GLOBAL_MARK,
                })
            })
            .collect()
    }

    pub async fn libraries(&self) -> Result<Vec<LibraryEntry>, LedgerError> {
        self.store
            .scan(Table::Libraries)
            .await?
            .into_iter()
            .map(|(k, v)| {
                Ok(LibraryEntry {
                    name: String::from_utf8_lossy(&k).into_owned(),
                    id: read_u16(Table::Libraries, &v)?,
                })
            })
            .collect()
    }

    pub async fn resources(&self) -> Result<Vec<(ResourceKey, Resource)>, LedgerError> {
        self.store
            .scan(Table::Resources)
            .await?
            .into_iter()
            .map(|(k, v)| Ok((key_from_bytes(Table::Resources, &k)?, Resource::decode(&v)?)))
            .collect()
    }

    pub async fn consumption(&self) -> Result<Vec<(ResourceKey, ResourceConsumption)>, LedgerError> {
        self.store
            .scan(Table::Consumption)
            .await?
            .into_iter()
            .map(|(k, v)| {
                Ok((
                    key_from_bytes(Table::Consumption, &k)?,
                    ResourceConsumption::decode(&v)?,
                ))
            })
            .collect()
    }
}

async fn consumption_keys<T: StoreTxn>(txn: &mut T) -> Result<Vec<ResourceKey>, LedgerError> {
    let mut keys = Vec::new();
    for (k, _) in txn.scan(Table::Consumption).await? {
        let key = key_from_bytes(Table::Consumption, &k)?;
        if keys.last() != Some(&key) {
            keys.push(key);
        }
    }
    Ok(keys)
}

async fn delete_consumption_keys<T: StoreTxn>(
    txn: &mut T,
    matches: impl Fn(ResourceKey) -> bool + Send,
) -> Result<usize, LedgerError> {
    let mut removed = 0;
    for key in consumption_keys(txn).await? {
        if matches(key) && txn.delete(Table::Consumption, &key_bytes(key)).await? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Drop the records under `key` that name `resource`, keeping the order of the
/// rest. Records that do not decode are kept.
async fn drop_records_for<T: StoreTxn>(
    txn: &mut T,
    key: ResourceKey,
    resource: ResourceKey,
) -> Result<usize, LedgerError> {
    let kb = key_bytes(key);
    let before = txn.duplicates(Table::Consumption, &kb).await?;
    let kept: Vec<&Vec<u8>> = before
        .iter()
        .filter(|raw| ResourceConsumption::decode(raw).map_or(true, |c| c.resource != resource))
        .collect();
    let removed = before.len() - kept.len();
    if removed > 0 {
        txn.delete(Table::Consumption, &kb).await?;
        for raw in kept {
            txn.put_dup(Table::Consumption, &kb, raw).await?;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    async fn ledger() -> ResourceLedger<SqliteStore> {
        ResourceLedger::new(SqliteStore::in_memory().await.unwrap())
    }

    fn req(key: u32, required: u32) -> ResourceRequirement {
        ResourceRequirement { key, required }
    }

    fn resource(available: u32) -> Resource {
        Resource {
            available,
            description: "test".into(),
        }
    }

    fn consumption(resource: u32, fixed_cost: u32) -> ResourceConsumption {
        ResourceConsumption {
            resource,
            fixed_cost,
            formula: String::new(),
        }
    }

    #[tokio::test]
    async fn resource_key_combines_function_and_library() {
        let l = ledger().await;
        l.add_function("filter", 0x0001, false).await.unwrap();
        l.add_function("timestamp", 0x0002, true).await.unwrap();
        l.add_library("libpcap", 0x0003).await.unwrap();

        assert_eq!(l.resource_key("filter", "libpcap").await.unwrap(), Some(0x0003_0001));
        assert_eq!(l.resource_key("timestamp", "anything").await.unwrap(), Some(0xFFFF_0002));
        assert_eq!(l.resource_key("filter", "libmissing").await.unwrap(), None);
        assert_eq!(l.resource_key("missing", "libpcap").await.unwrap(), None);
    }

    #[tokio::test]
    async fn check_reports_the_short_resource() {
        let l = ledger().await;
        l.add_resource(1, &resource(100)).await.unwrap();
        l.add_resource(2, &resource(10)).await.unwrap();

        assert_eq!(l.check(&[req(1, 50), req(2, 10)]).await.unwrap(), CheckOutcome::Ok);
        assert_eq!(
            l.check(&[req(1, 50), req(2, 11)]).await.unwrap(),
            CheckOutcome::Insufficient(Shortfall { index: 1, key: 2, required: 11, available: 10 })
        );
        assert!(matches!(l.check(&[req(9, 1)]).await, Err(LedgerError::UnknownResource(9))));
    }

    #[tokio::test]
    async fn allocate_then_deallocate_restores_availability() {
        let l = ledger().await;
        l.add_resource(1, &resource(100)).await.unwrap();
        l.add_resource(2, &resource(7)).await.unwrap();
        let reqs = [req(1, 40), req(2, 7)];

        l.allocate(&reqs).await.unwrap();
        assert_eq!(l.resource(1).await.unwrap().unwrap().available, 60);
        assert_eq!(l.resource(2).await.unwrap().unwrap().available, 0);

        l.deallocate(&reqs).await.unwrap();
        assert_eq!(l.resource(1).await.unwrap().unwrap().available, 100);
        assert_eq!(l.resource(2).await.unwrap().unwrap().available, 7);
    }

    #[tokio::test]
    async fn failed_allocation_changes_nothing() {
        let l = ledger().await;
        l.add_resource(1, &resource(100)).await.unwrap();
        l.add_resource(2, &resource(5)).await.unwrap();

        let err = l.allocate(&[req(1, 40), req(2, 6)]).await.unwrap_err();
        assert!(matches!(err, LedgerError::Insufficient { index: 1, key: 2, required: 6, available: 5 }));
        assert_eq!(l.resource(1).await.unwrap().unwrap().available, 100);
        assert_eq!(l.resource(2).await.unwrap().unwrap().available, 5);
    }

    #[tokio::test]
    async fn deallocate_overflow_aborts() {
        let l = ledger().await;
        l.add_resource(1, &resource(10)).await.unwrap();
        l.add_resource(2, &resource(u32::MAX)).await.unwrap();
        assert!(matches!(l.deallocate(&[req(1, 5), req(2, 1)]).await, Err(LedgerError::Overflow(2))));
        assert_eq!(l.resource(1).await.unwrap().unwrap().available, 10);
    }

    #[tokio::test]
    async fn deleting_a_function_cascades() {
        let l = ledger().await;
        l.add_function("filter", 1, false).await.unwrap();
        l.add_function("sample", 2, false).await.unwrap();
        l.add_library("liba", 1).await.unwrap();
        l.add_library("libb", 2).await.unwrap();
        l.add_resource(10, &resource(100)).await.unwrap();

        for key in [0x0001_0001, 0x0002_0001, 0x0001_0002] {
            l.add_consumption(key, &consumption(10, 1)).await.unwrap();
        }
        assert_eq!(l.del_function("filter").await.unwrap(), 2);

        let left: Vec<u32> = l.consumption().await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(left, vec![0x0001_0002]);
        assert_eq!(l.resource_key("filter", "liba").await.unwrap(), None);
    }

    #[tokio::test]
    async fn deleting_a_library_cascades() {
        let l = ledger().await;
        l.add_library("liba", 1).await.unwrap();
        l.add_library("libb", 2).await.unwrap();
        l.add_resource(10, &resource(100)).await.unwrap();
        for key in [0x0001_0001, 0x0001_0002, 0x0002_0001, 0xFFFF_0001] {
            l.add_consumption(key, &consumption(10, 1)).await.unwrap();
        }
        assert_eq!(l.del_library("liba").await.unwrap(), 2);

        let left: Vec<u32> = l.consumption().await.unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(left, vec![0x0002_0001, 0xFFFF_0001]);
    }

    #[tokio::test]
    async fn deleting_a_resource_removes_its_records() {
        let l = ledger().await;
        l.add_resource(10, &resource(100)).await.unwrap();
        l.add_resource(11, &resource(100)).await.unwrap();
        l.add_consumption(0x0001_0001, &consumption(10, 1)).await.unwrap();
        l.add_consumption(0x0001_0001, &consumption(11, 1)).await.unwrap();
        l.add_consumption(0x0001_0002, &consumption(10, 3)).await.unwrap();

        assert_eq!(l.del_resource(10).await.unwrap(), 2);
        assert_eq!(l.consumption().await.unwrap(), vec![(0x0001_0001, consumption(11, 1))]);
    }

    #[tokio::test]
    async fn del_consumption_removes_every_matching_duplicate() {
        let l = ledger().await;
        l.add_resource(10, &resource(100)).await.unwrap();
        l.add_resource(11, &resource(100)).await.unwrap();
        for (r, c) in [(10, 1), (10, 2), (11, 3), (10, 4), (10, 5)] {
            l.add_consumption(0x0001_0001, &consumption(r, c)).await.unwrap();
        }

        assert_eq!(l.del_consumption(0x0001_0001, 10).await.unwrap(), 4);
        assert_eq!(l.consumption_for(0x0001_0001).await.unwrap(), vec![consumption(11, 3)]);
    }

    #[tokio::test]
    async fn reserved_and_duplicate_ids_are_refused() {
        let l = ledger().await;
        assert!(matches!(l.add_library("libx", RESERVED_LIBRARY_ID).await, Err(LedgerError::ReservedId(_))));
        l.add_library("liba", 1).await.unwrap();
        assert!(matches!(l.add_library("libb", 1).await, Err(LedgerError::Exists(_))));
        l.add_function("f", 1, false).await.unwrap();
        assert!(matches!(l.add_function("g", 1, true).await, Err(LedgerError::Exists(_))));
        assert!(matches!(
            l.add_consumption(1, &consumption(99, 1)).await,
            Err(LedgerError::UnknownResource(99))
        ));
    }
}
