#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use admctrl_core::protocol::ResourceRequirement;
use admctrl_daemon::ledger::{CheckOutcome, LedgerError, Resource, ResourceLedger, SqliteStore};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

async fn ledger(available: &[u32]) -> ResourceLedger<SqliteStore> {
    let l = ResourceLedger::new(SqliteStore::in_memory().await.unwrap());
    for (i, &a) in available.iter().enumerate() {
        let r = Resource {
            available: a,
            description: format!("r{i}"),
        };
        l.add_resource(i as u32 + 1, &r).await.unwrap();
    }
    l
}

async fn snapshot(l: &ResourceLedger<SqliteStore>) -> Vec<u32> {
    l.resources().await.unwrap().into_iter().map(|(_, r)| r.available).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn allocate_then_deallocate_restores(
        cells in prop::collection::vec((0u32..1_000_000, 0u32..1_000_000), 1..8)
    ) {
        let available: Vec<u32> = cells.iter().map(|(a, r)| *a.max(r)).collect();
        let reqs: Vec<ResourceRequirement> = cells
            .iter()
            .enumerate()
            .map(|(i, (_, r))| ResourceRequirement { key: i as u32 + 1, required: *r })
            .collect();

        runtime().block_on(async {
            let l = ledger(&available).await;
            prop_assert_eq!(l.check(&reqs).await.unwrap(), CheckOutcome::Ok);
            l.allocate(&reqs).await.unwrap();
            l.deallocate(&reqs).await.unwrap();
            prop_assert_eq!(snapshot(&l).await, available.clone());
            Ok::<(), TestCaseError>(())
        })?;
    }

    #[test]
    fn failed_allocation_changes_nothing(
        available in prop::collection::vec(0u32..1000, 2..8),
        short in any::<prop::sample::Index>(),
    ) {
        let short = short.index(available.len());
        let reqs: Vec<ResourceRequirement> = available
            .iter()
            .enumerate()
            .map(|(i, &a)| ResourceRequirement {
                key: i as u32 + 1,
                required: if i == short { a + 1 } else { a },
            })
            .collect();

        runtime().block_on(async {
            let l = ledger(&available).await;
            match l.check(&reqs).await.unwrap() {
                CheckOutcome::Insufficient(s) => {
                    prop_assert_eq!(s.index as usize, short);
                    prop_assert_eq!(s.key, short as u32 + 1);
                    prop_assert_eq!(s.available, available[short]);
                }
                CheckOutcome::Ok => prop_assert!(false, "shortfall not detected"),
            }
            let err = l.allocate(&reqs).await.unwrap_err();
            prop_assert!(matches!(err, LedgerError::Insufficient { .. }), "{err}");
            prop_assert_eq!(snapshot(&l).await, available.clone());
            Ok::<(), TestCaseError>(())
        })?;
    }
}
