//! Contract Test: Dry-Run Purity
//!
//! Constraints verified:
//! - A dry run issues zero create/update requests
//! - A dry run reports the same actions an apply run then performs
//! - Data-level problems never make a dry run fail
//!
//! If this test fails, dry runs are no longer safe to call against production.

mod common;

use common::*;
use hostsync_core::traits::{Device, DeviceStatus};
use hostsync_core::{ErrorKind, SyncAction, SyncMode};
use std::net::Ipv4Addr;

fn mixed_inventory() -> Vec<Device> {
    vec![
        Device::new("D1", "server1", "192.168.1.10").with_status(DeviceStatus::Up),
        Device::new("D2", "server2", "192.168.1.11").with_status(DeviceStatus::Up),
        Device::new("D3", "server3", "not-an-address"),
        Device::new("D4", "server4", "192.168.1.13").with_status(DeviceStatus::Down),
    ]
}

/// Seed server2 as converged and server4 with a stale address
async fn seed_existing(ipam: &FakeIpam) {
    let (engine, _events) = engine_with(
        FakeInventory::new(vec![
            Device::new("D2", "server2", "192.168.1.11").with_status(DeviceStatus::Up),
            Device::new("D4", "server4", "192.168.1.99").with_status(DeviceStatus::Down),
        ]),
        FakeIpam::sharing_counters_with(ipam),
        fast_engine_config(),
    );
    engine.run(SyncMode::Apply, None).await.unwrap();
}

#[tokio::test]
async fn dry_run_issues_no_writes() {
    let ipam = FakeIpam::new();
    seed_existing(&ipam).await;
    let writes_before = ipam.write_call_count();

    let (engine, _events) = engine_with(
        FakeInventory::new(mixed_inventory()),
        FakeIpam::sharing_counters_with(&ipam),
        fast_engine_config(),
    );
    let result = engine.run(SyncMode::DryRun, None).await.unwrap();

    assert!(result.dry_run);
    assert_eq!(ipam.write_call_count(), writes_before);
    assert_eq!(
        ipam.record("server4.example.com").unwrap().ipv4_addrs,
        vec![Ipv4Addr::new(192, 168, 1, 99)],
        "Dry run must not touch stored state"
    );
    assert!(ipam.record("server1.example.com").is_none());
}

#[tokio::test]
async fn dry_run_predicts_apply() {
    let ipam = FakeIpam::new();
    seed_existing(&ipam).await;

    let (engine, _events) = engine_with(
        FakeInventory::new(mixed_inventory()),
        FakeIpam::sharing_counters_with(&ipam),
        fast_engine_config(),
    );

    let planned = engine.run(SyncMode::DryRun, None).await.unwrap();
    let applied = engine.run(SyncMode::Apply, None).await.unwrap();

    let actions = |r: &hostsync_core::SyncResult| -> Vec<SyncAction> {
        r.outcomes.iter().map(|o| o.action).collect()
    };
    assert_eq!(actions(&planned), actions(&applied));
    assert_eq!(
        actions(&planned),
        vec![
            SyncAction::Created,
            SyncAction::Unchanged,
            SyncAction::Skipped,
            SyncAction::Updated,
        ]
    );
    assert_eq!(planned.counts, applied.counts);

    let d4 = planned.outcome("D4").unwrap();
    assert_eq!(d4.changes, applied.outcome("D4").unwrap().changes);
    assert!(d4.reference.is_some());
}

#[tokio::test]
async fn dry_run_tolerates_bad_data() {
    let ipam = FakeIpam::new();
    let (engine, _events) = engine_with(
        FakeInventory::new(vec![
            Device::new("D1", "", "192.168.1.10"),
            Device::new("D2", "server2", ""),
            Device::new("D3", "server3", "0.0.0.0"),
        ]),
        FakeIpam::sharing_counters_with(&ipam),
        fast_engine_config(),
    );

    let result = engine.run(SyncMode::DryRun, None).await.unwrap();

    assert_eq!(result.counts.skipped, 3);
    for outcome in &result.outcomes {
        let error = outcome.error.as_ref().unwrap();
        assert_eq!(error.kind, ErrorKind::Validation);
        assert!(outcome.fqdn.is_none());
    }
    assert_eq!(ipam.find_call_count(), 0, "Rejected devices never reach the IPAM");
}
