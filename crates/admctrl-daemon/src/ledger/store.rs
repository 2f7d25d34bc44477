//! Transactional key/value store seam used by the resource ledger.

use async_trait::async_trait;

use super::LedgerError;

/// Tables kept by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// function name -> id word
    Functions,
    /// library name -> library id
    Libraries,
    /// resource key -> consumption records (duplicates allowed)
    Consumption,
    /// resource key -> available amount and description
    Resources,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Functions => "functions",
            Table::Libraries => "libraries",
            Table::Consumption => "consumption",
            Table::Resources => "resources",
        }
    }
}

/// Byte-keyed store shared by every process that opens the same backing file.
///
/// Reads on the store see committed state. Writes only happen inside a
/// [`StoreTxn`], which holds the store's write lock from `begin` until it is
/// committed or dropped; a dropped transaction rolls back.
#[async_trait]
pub trait TransactionalStore: Send + Sync {
    type Txn: StoreTxn;

    async fn begin(&self) -> Result<Self::Txn, LedgerError>;

    /// First value stored under `key`.
    async fn get(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError>;

    /// Every value stored under `key`, in insertion order.
    async fn duplicates(&self, table: Table, key: &[u8]) -> Result<Vec<Vec<u8>>, LedgerError>;

    /// All `(key, value)` pairs of a table in key order, duplicates included.
    async fn scan(&self, table: Table) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LedgerError>;
}

/// Open write transaction. Reads see its own writes.
#[async_trait]
pub trait StoreTxn: Send {
    async fn get(&mut self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, LedgerError>;

    async fn duplicates(&mut self, table: Table, key: &[u8]) -> Result<Vec<Vec<u8>>, LedgerError>;

    async fn scan(&mut self, table: Table) -> Result<Vec<(Vec<u8>, Vec<u8>)>, LedgerError>;

    /// Replace all values under `key` with `value`.
    async fn put(&mut self, table: Table, key: &[u8], value: &[u8]) -> Result<(), LedgerError>;

    /// Append `value` under `key`.
    async fn put_dup(&mut self, table: Table, key: &[u8], value: &[u8]) -> Result<(), LedgerError>;

    /// Remove `key` and all its values. Returns whether it existed.
    async fn delete(&mut self, table: Table, key: &[u8]) -> Result<bool, LedgerError>;

    async fn commit(self) -> Result<(), LedgerError>;
}
