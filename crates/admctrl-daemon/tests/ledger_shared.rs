//! Two ledger handles on one database file, as `authd` and `authdb` run.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::path::Path;

use admctrl_core::protocol::ResourceRequirement;
use admctrl_daemon::ledger::{Resource, ResourceConsumption, ResourceLedger, SqliteStore};

async fn open(path: &Path) -> ResourceLedger<SqliteStore> {
    ResourceLedger::new(SqliteStore::open(path).await.unwrap())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interleaved_writers_lose_no_updates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resource.db");

    let daemon = open(&path).await;
    let admin = open(&path).await;
    daemon
        .add_resource(1, &Resource { available: 10_000, description: "cpu".into() })
        .await
        .unwrap();

    let one = [ResourceRequirement { key: 1, required: 7 }];
    let allocations = {
        let daemon = daemon.clone();
        tokio::spawn(async move {
            for _ in 0..50 {
                daemon.allocate(&one).await.unwrap();
            }
        })
    };
    let admin_side = {
        let admin = admin.clone();
        tokio::spawn(async move {
            for i in 0..50u32 {
                admin
                    .add_resource(100 + i, &Resource { available: i, description: String::new() })
                    .await
                    .unwrap();
                admin.deallocate(&[ResourceRequirement { key: 1, required: 3 }]).await.unwrap();
            }
        })
    };
    allocations.await.unwrap();
    admin_side.await.unwrap();

    // 10000 - 50 * 7 + 50 * 3
    for l in [&daemon, &admin] {
        assert_eq!(l.resource(1).await.unwrap().unwrap().available, 9_800);
        assert_eq!(l.resources().await.unwrap().len(), 51);
    }
}

#[tokio::test]
async fn admin_changes_reach_a_running_daemon() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resource.db");

    let daemon = open(&path).await;
    let admin = open(&path).await;

    admin.add_function("sample", 3, false).await.unwrap();
    admin.add_library("libsampling", 1).await.unwrap();
    admin
        .add_resource(1, &Resource { available: 50, description: "cpu".into() })
        .await
        .unwrap();
    admin
        .add_consumption(
            0x0001_0003,
            &ResourceConsumption { resource: 1, fixed_cost: 5, formula: String::new() },
        )
        .await
        .unwrap();

    assert_eq!(daemon.resource_key("sample", "libsampling").await.unwrap(), Some(0x0001_0003));
    daemon.allocate(&[ResourceRequirement { key: 1, required: 20 }]).await.unwrap();

    admin.set_available(1, 100).await.unwrap();
    daemon.allocate(&[ResourceRequirement { key: 1, required: 20 }]).await.unwrap();
    assert_eq!(admin.resource(1).await.unwrap().unwrap().available, 80);

    assert_eq!(admin.del_resource(1).await.unwrap(), 1);
    assert!(daemon.consumption().await.unwrap().is_empty());
}
