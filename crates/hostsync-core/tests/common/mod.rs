//! Test doubles and common utilities for sync contract tests
//!
//! The fakes here keep just enough state to make the engine's observable
//! behaviour checkable: an in-memory IPAM appliance with call counters and
//! switchable failure modes, and a fixed inventory.

#![allow(dead_code)]

use hostsync_core::error::{Error, ErrorKind, Result};
use hostsync_core::traits::{Device, ExistingHostRecord, HostRecordTarget, InventorySource, IpamSink};
use hostsync_core::{CancelHandle, EngineConfig, EngineEvent, MappingConfig, SyncEngine};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// An inventory source returning a fixed device list
pub struct FakeInventory {
    devices: Vec<Device>,
    failure: Option<ErrorKind>,
    fetch_call_count: Arc<AtomicUsize>,
}

impl FakeInventory {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices,
            failure: None,
            fetch_call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// An inventory whose listing always fails with the given kind
    pub fn failing(kind: ErrorKind) -> Self {
        Self {
            failure: Some(kind),
            ..Self::new(Vec::new())
        }
    }

    pub fn fetch_call_count(&self) -> usize {
        self.fetch_call_count.load(Ordering::SeqCst)
    }

    /// Create a new FakeInventory that shares counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            devices: other.devices.clone(),
            failure: other.failure,
            fetch_call_count: Arc::clone(&other.fetch_call_count),
        }
    }
}

#[async_trait::async_trait]
impl InventorySource for FakeInventory {
    async fn fetch_devices(&self, limit: Option<usize>) -> Result<Vec<Device>> {
        self.fetch_call_count.fetch_add(1, Ordering::SeqCst);
        match self.failure {
            Some(ErrorKind::Auth) => Err(Error::auth("WhatsUp Gold rejected credentials")),
            Some(ErrorKind::Transient) => Err(Error::transient("WhatsUp Gold unavailable")),
            Some(_) => Err(Error::protocol("malformed device listing")),
            None => {
                let limit = limit.unwrap_or(usize::MAX);
                Ok(self.devices.iter().take(limit).cloned().collect())
            }
        }
    }

    fn source_name(&self) -> &'static str {
        "fake-inventory"
    }
}

/// Shared state of a [`FakeIpam`]
#[derive(Default)]
struct IpamState {
    records: Mutex<HashMap<String, ExistingHostRecord>>,
    next_id: AtomicUsize,
    find_calls: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    /// FQDNs whose writes fail with a conflict
    conflicts: Mutex<HashSet<String>>,
    /// Remaining writes that fail with 503 (`usize::MAX` = forever)
    transient_write_failures: AtomicUsize,
    /// Remaining finds that fail with 503
    transient_find_failures: AtomicUsize,
    /// Remaining writes that are stored but still answer 503
    lost_write_responses: AtomicUsize,
    /// Fire this handle once `cancel_after` creates have happened
    cancel: Mutex<Option<(usize, CancelHandle)>>,
}

/// An in-memory IPAM appliance that tracks calls
pub struct FakeIpam {
    state: Arc<IpamState>,
}

impl FakeIpam {
    pub fn new() -> Self {
        Self {
            state: Arc::new(IpamState::default()),
        }
    }

    /// Create a new FakeIpam that shares records and counters with an existing one
    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            state: Arc::clone(&other.state),
        }
    }

    /// Store a record as if it had been created out of band
    pub fn seed(&self, record: ExistingHostRecord) {
        self.state
            .records
            .lock()
            .unwrap()
            .insert(record.fqdn.clone(), record);
    }

    pub fn record(&self, fqdn: &str) -> Option<ExistingHostRecord> {
        self.state.records.lock().unwrap().get(fqdn).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.state.records.lock().unwrap().len()
    }

    pub fn find_call_count(&self) -> usize {
        self.state.find_calls.load(Ordering::SeqCst)
    }

    pub fn create_call_count(&self) -> usize {
        self.state.create_calls.load(Ordering::SeqCst)
    }

    pub fn update_call_count(&self) -> usize {
        self.state.update_calls.load(Ordering::SeqCst)
    }

    pub fn write_call_count(&self) -> usize {
        self.create_call_count() + self.update_call_count()
    }

    /// Make every write for `fqdn` fail with a duplicate-address conflict
    pub fn conflict_on(&self, fqdn: &str) {
        self.state
            .conflicts
            .lock()
            .unwrap()
            .insert(fqdn.to_string());
    }

    /// Make the next `n` writes fail with 503
    pub fn fail_writes_transiently(&self, n: usize) {
        self.state
            .transient_write_failures
            .store(n, Ordering::SeqCst);
    }

    /// Make the next `n` writes take effect but report 503, as when the
    /// response is lost after the appliance committed
    pub fn lose_write_responses(&self, n: usize) {
        self.state.lost_write_responses.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` finds fail with 503
    pub fn fail_finds_transiently(&self, n: usize) {
        self.state
            .transient_find_failures
            .store(n, Ordering::SeqCst);
    }

    /// Cancel the run through `handle` once `creates` records were created
    pub fn cancel_after_creates(&self, creates: usize, handle: CancelHandle) {
        *self.state.cancel.lock().unwrap() = Some((creates, handle));
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }

    fn check_write(&self, fqdn: &str) -> Result<()> {
        if Self::take_failure(&self.state.transient_write_failures) {
            return Err(Error::transient("Infoblox server error (HTTP 503)"));
        }
        if self.state.conflicts.lock().unwrap().contains(fqdn) {
            return Err(Error::conflict(format!(
                "IP address already used by another host ({fqdn})"
            )));
        }
        Ok(())
    }

    fn check_response(&self) -> Result<()> {
        if Self::take_failure(&self.state.lost_write_responses) {
            return Err(Error::transient("Infoblox request timed out"));
        }
        Ok(())
    }
}

fn stored(reference: String, target: &HostRecordTarget) -> ExistingHostRecord {
    ExistingHostRecord {
        reference,
        fqdn: target.fqdn.clone(),
        ipv4_addrs: vec![target.ipv4],
        mac: target.mac.clone(),
        extattrs: target.extattrs.clone(),
    }
}

#[async_trait::async_trait]
impl IpamSink for FakeIpam {
    async fn find_host_record(&self, fqdn: &str) -> Result<Option<ExistingHostRecord>> {
        self.state.find_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.state.transient_find_failures) {
            return Err(Error::transient("Infoblox server error (HTTP 503)"));
        }
        Ok(self.record(fqdn))
    }

    async fn create_host_record(&self, target: &HostRecordTarget) -> Result<String> {
        let creates = self.state.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.check_write(&target.fqdn)?;
        if self.record(&target.fqdn).is_some() {
            return Err(Error::conflict(format!(
                "The record '{}' already exists.",
                target.fqdn
            )));
        }

        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        let reference = format!("record:host/ZG5z{id}:{}/default", target.fqdn);
        self.seed(stored(reference.clone(), target));

        if let Some((after, handle)) = self.state.cancel.lock().unwrap().as_ref()
            && creates >= *after
        {
            handle.cancel();
        }

        self.check_response()?;
        Ok(reference)
    }

    async fn update_host_record(&self, reference: &str, desired: &HostRecordTarget) -> Result<String> {
        self.state.update_calls.fetch_add(1, Ordering::SeqCst);
        self.check_write(&desired.fqdn)?;

        let mut records = self.state.records.lock().unwrap();
        let fqdn = records
            .values()
            .find(|r| r.reference == reference)
            .map(|r| r.fqdn.clone())
            .ok_or_else(|| Error::protocol(format!("unknown reference {reference}")))?;
        records.remove(&fqdn);
        records.insert(desired.fqdn.clone(), stored(reference.to_string(), desired));
        drop(records);

        self.check_response()?;
        Ok(reference.to_string())
    }

    fn sink_name(&self) -> &'static str {
        "fake-ipam"
    }
}

/// Mapping config used by every contract test
pub fn mapping() -> MappingConfig {
    MappingConfig::new("example.com")
}

/// Engine config with millisecond retry delays and deterministic backoff
pub fn fast_engine_config() -> EngineConfig {
    EngineConfig {
        max_attempts: 3,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 4,
        retry_jitter: false,
        concurrency: 1,
        event_channel_capacity: 1000,
    }
}

/// Build an engine over the given fakes
pub fn engine_with(
    inventory: FakeInventory,
    ipam: FakeIpam,
    config: EngineConfig,
) -> (SyncEngine, mpsc::Receiver<EngineEvent>) {
    SyncEngine::new(Box::new(inventory), Box::new(ipam), mapping(), config)
        .expect("engine construction succeeds")
}

/// Drain every event emitted so far
pub fn drain_events(rx: &mut mpsc::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
