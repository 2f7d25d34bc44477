//! Per-request resource requirements from a function catalog.

use admctrl_core::catalog::Catalog;
use admctrl_core::cost::{variable_cost, CostArg};
use admctrl_core::limits::MAX_RESOURCES;
use admctrl_core::protocol::ResourceRequirement;

use super::{LedgerError, ResourceLedger, TransactionalStore};

impl<S: TransactionalStore> ResourceLedger<S> {
    /// Sum what every instance in `catalog` consumes, merged by resource key in
    /// first-seen order.
    ///
    /// Function/library pairs unknown to the ledger, or without consumption
    /// records, cost nothing.
    pub async fn requirements_for(
        &self,
        catalog: &Catalog,
    ) -> Result<Vec<ResourceRequirement>, LedgerError> {
        let mut out: Vec<ResourceRequirement> = Vec::new();

        for ft in catalog.functions() {
            for lib in &ft.libraries {
                let Some(key) = self.resource_key(&ft.name, &lib.name).await? else {
                    continue;
                };
                let records = self.consumption_for(key).await?;
                if records.is_empty() {
                    continue;
                }
                for inst in &lib.instances {
                    let args: Vec<CostArg> = inst.args.iter().map(CostArg::from).collect();
                    for rec in &records {
                        let variable = if rec.formula.is_empty() {
                            0
                        } else {
                            variable_cost(&rec.formula, &args).map_err(|source| LedgerError::Cost {
                                function: ft.name.clone(),
                                library: lib.name.clone(),
                                source,
                            })?
                        };
                        let amount = rec
                            .fixed_cost
                            .checked_add(variable)
                            .ok_or(LedgerError::Overflow(rec.resource))?;
                        add_requirement(&mut out, rec.resource, amount)?;
                    }
                }
            }
        }
        Ok(out)
    }
}

fn add_requirement(
    out: &mut Vec<ResourceRequirement>,
    key: u32,
    amount: u32,
) -> Result<(), LedgerError> {
    if let Some(r) = out.iter_mut().find(|r| r.key == key) {
        r.required = r.required.checked_add(amount).ok_or(LedgerError::Overflow(key))?;
        return Ok(());
    }
    if out.len() >= MAX_RESOURCES {
        return Err(LedgerError::TooManyResources);
    }
    out.push(ResourceRequirement { key, required: amount });
    Ok(())
}
