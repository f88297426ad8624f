//! Core sync engine
//!
//! The SyncEngine is responsible for:
//! - Fetching the device inventory via InventorySource
//! - Mapping each device into a host-record target
//! - Querying and upserting host records via IpamSink
//! - Aggregating per-device outcomes into a SyncResult
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ InventorySource │─── Vec<Device> ───┐
//! └─────────────────┘                   │
//!                                       ▼
//!                              ┌──────────────┐
//!                              │  SyncEngine  │
//!                              └──────────────┘
//!                                       │ per device
//!         ┌─────────────────────────────┼───────────────────────────┐
//!         │                             │                           │
//!         ▼                             ▼                           ▼
//! ┌───────────────┐            ┌──────────────┐            ┌─────────────┐
//! │  map_device   │            │   IpamSink   │            │   Events    │
//! │ (pure)        │            │ (find/upsert)│            │  (notify)   │
//! └───────────────┘            └──────────────┘            └─────────────┘
//! ```
//!
//! ## Per-device Flow
//!
//! 1. Map the device; a validation failure marks it skipped
//! 2. Find the existing record (retried on transient failures)
//! 3. Dry run: plan the upsert without writing
//! 4. Apply: upsert (retried on transient failures)
//! 5. Emit event for monitoring/logging
//!
//! Per-device errors never abort the run. Only an inventory failure is fatal.

mod result;

pub use result::{OutcomeError, SyncAction, SyncCounts, SyncMode, SyncOutcome, SyncResult};

use crate::config::{EngineConfig, MappingConfig};
use crate::error::{Error, ErrorKind, Result};
use crate::mapping::map_device;
use crate::plan::plan_upsert;
use crate::retry::{RetryAttempt, RetryPolicy};
use crate::traits::{Device, HostRecordTarget, InventorySource, IpamSink, UpsertAction};
use futures::stream::{self, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Events emitted by the SyncEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A run started
    RunStarted {
        dry_run: bool,
        limit: Option<usize>,
    },

    /// Inventory fetched
    DevicesFetched { count: usize },

    /// Device skipped (mapping rejected it, or the run was cancelled)
    DeviceSkipped {
        device_id: String,
        kind: ErrorKind,
        reason: String,
    },

    /// A remote operation failed transiently and will be retried
    RetryScheduled {
        device_id: String,
        operation: &'static str,
        attempt: u32,
        delay: Duration,
    },

    /// Device resolved to created, updated or unchanged
    ///
    /// In dry-run mode the action is what an apply would have done.
    DeviceApplied {
        device_id: String,
        fqdn: String,
        action: SyncAction,
        dry_run: bool,
    },

    /// Device failed after retries or with a non-retryable error
    DeviceFailed {
        device_id: String,
        kind: ErrorKind,
        error: String,
        attempts: u32,
    },

    /// Inventory could not be fetched; the run produced no result
    RunFailed { kind: ErrorKind, error: String },

    /// A run finished
    RunFinished { counts: SyncCounts, cancelled: bool },
}

/// Cooperative cancellation flag for a sync run
///
/// Cancelling stops new devices from being started and new upserts from being
/// issued. Operations already in flight finish normally.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    rx: Option<watch::Receiver<bool>>,
}

/// Trigger side of a [`CancelSignal`]
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    /// A signal that never fires
    pub fn never() -> Self {
        Self { rx: None }
    }

    /// A connected handle/signal pair
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx: Some(rx) })
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }
}

impl CancelHandle {
    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Core sync engine
///
/// The engine orchestrates one inventory → IPAM pass per [`run`](Self::run)
/// call. It holds no state between runs: the IPAM appliance is queried fresh
/// every time.
///
/// ## Lifecycle
///
/// 1. Create with [`SyncEngine::new()`]
/// 2. Call [`SyncEngine::run()`] or [`SyncEngine::run_with_cancel()`] as often as needed
/// 3. Drop to cleanup
///
/// ## Concurrency
///
/// Devices are processed through a bounded fan-out of `concurrency` tasks.
/// Outcomes are always returned in inventory order. Concurrent calls to `run`
/// are not coordinated here; callers that need serialization hold their own
/// lock.
pub struct SyncEngine {
    /// Inventory source for device listings
    source: Box<dyn InventorySource>,

    /// IPAM sink for host records
    sink: Box<dyn IpamSink>,

    /// Mapping settings (zone)
    mapping: MappingConfig,

    /// Retry policy for find and upsert
    retry: RetryPolicy,

    /// Devices processed in parallel
    concurrency: usize,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<EngineEvent>,
}

impl SyncEngine {
    /// Create a new sync engine
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        source: Box<dyn InventorySource>,
        sink: Box<dyn IpamSink>,
        mapping: MappingConfig,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<EngineEvent>)> {
        mapping.validate()?;
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.event_channel_capacity);

        let engine = Self {
            source,
            sink,
            mapping,
            retry: config.retry_policy(),
            concurrency: config.concurrency,
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Run one sync pass
    ///
    /// # Returns
    ///
    /// - `Ok(SyncResult)`: every device has an outcome, failures included
    /// - `Err(Error)`: the inventory could not be fetched
    pub async fn run(&self, mode: SyncMode, limit: Option<usize>) -> Result<SyncResult> {
        self.run_with_cancel(mode, limit, CancelSignal::never())
            .await
    }

    /// Run one sync pass that stops starting new work once `cancel` fires
    ///
    /// Devices not started before cancellation are reported as skipped with
    /// kind `cancelled`, and [`SyncResult::cancelled`] is set.
    pub async fn run_with_cancel(
        &self,
        mode: SyncMode,
        limit: Option<usize>,
        cancel: CancelSignal,
    ) -> Result<SyncResult> {
        let started_at = chrono::Utc::now();
        let dry_run = mode.is_dry_run();

        self.emit_event(EngineEvent::RunStarted { dry_run, limit });
        info!(
            source = self.source.source_name(),
            sink = self.sink.sink_name(),
            dry_run,
            ?limit,
            "Sync run started"
        );

        let devices = match self.source.fetch_devices(limit).await {
            Ok(devices) => devices,
            Err(e) => {
                error!(error = %e, kind = %e.kind(), "Failed to fetch inventory");
                self.emit_event(EngineEvent::RunFailed {
                    kind: e.kind(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        self.emit_event(EngineEvent::DevicesFetched {
            count: devices.len(),
        });
        debug!(count = devices.len(), "Inventory fetched");

        let cancel = &cancel;
        let mut indexed: Vec<(usize, SyncOutcome)> = stream::iter(0..devices.len())
            .map(|index| {
                let device = &devices[index];
                async move { (index, self.process_device(device, mode, cancel).await) }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);

        let outcomes: Vec<SyncOutcome> = indexed.into_iter().map(|(_, o)| o).collect();
        let counts = SyncCounts::from_outcomes(devices.len(), &outcomes);
        let cancelled = outcomes.iter().any(SyncOutcome::is_cancelled);

        self.emit_event(EngineEvent::RunFinished { counts, cancelled });
        info!(
            dry_run,
            cancelled,
            discovered = counts.discovered,
            created = counts.created,
            updated = counts.updated,
            unchanged = counts.unchanged,
            skipped = counts.skipped,
            failed = counts.failed,
            "Sync run finished"
        );

        Ok(SyncResult {
            dry_run,
            cancelled,
            started_at,
            finished_at: chrono::Utc::now(),
            counts,
            outcomes,
        })
    }

    /// Drive one device to an outcome
    async fn process_device(
        &self,
        device: &Device,
        mode: SyncMode,
        cancel: &CancelSignal,
    ) -> SyncOutcome {
        if cancel.is_cancelled() {
            return self.skip(device, None, Error::cancelled("run cancelled before device started"));
        }

        let target = match map_device(device, &self.mapping) {
            Ok(target) => target,
            Err(e) => return self.skip(device, None, e),
        };

        let (existing, find_attempts) = self
            .with_retry(&device.id, "find_host_record", || {
                self.sink.find_host_record(&target.fqdn)
            })
            .await;
        let existing = match existing {
            Ok(existing) => existing,
            Err(e) => return self.fail(device, &target, find_attempts, e),
        };

        if mode.is_dry_run() {
            let plan = plan_upsert(&target, existing.as_ref());
            let outcome = SyncOutcome::resolved(
                device,
                &target,
                plan.action(),
                plan.reference().map(str::to_string),
                plan.changes().to_vec(),
                find_attempts,
            );
            return self.resolved(outcome, true);
        }

        if cancel.is_cancelled() {
            return self.skip(
                device,
                Some(&target),
                Error::cancelled("run cancelled before upsert"),
            );
        }

        let initial = plan_upsert(&target, existing.as_ref());
        let mut snapshot = Some(existing);
        let (upserted, attempts) = self
            .with_retry(&device.id, "upsert_host_record", || {
                // A failed write may still have committed, so retries re-read the record
                let known = snapshot.take();
                let target = &target;
                async move {
                    let current = match known {
                        Some(existing) => existing,
                        None => self.sink.find_host_record(&target.fqdn).await?,
                    };
                    self.sink.upsert_host_record(target, current.as_ref()).await
                }
            })
            .await;

        match upserted {
            Ok(mut outcome) => {
                if outcome.action == UpsertAction::Unchanged
                    && initial.action() != UpsertAction::Unchanged
                {
                    // Converged through a write that reported failure
                    outcome.action = initial.action();
                    outcome.changes = initial.changes().to_vec();
                }
                self.resolved(
                    SyncOutcome::resolved(
                        device,
                        &target,
                        outcome.action,
                        Some(outcome.reference),
                        outcome.changes,
                        attempts,
                    ),
                    false,
                )
            }
            Err(e) => self.fail(device, &target, attempts, e),
        }
    }

    /// Run an IPAM operation under the retry policy, reporting each retry
    async fn with_retry<T, F, Fut>(&self, device_id: &str, operation: &'static str, f: F) -> (Result<T>, u32)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.retry
            .run_observed(operation, f, |retry: &RetryAttempt<'_>| {
                self.emit_event(EngineEvent::RetryScheduled {
                    device_id: device_id.to_string(),
                    operation,
                    attempt: retry.attempt,
                    delay: retry.delay,
                });
            })
            .await
    }

    fn skip(&self, device: &Device, target: Option<&HostRecordTarget>, error: Error) -> SyncOutcome {
        if error.kind() == ErrorKind::Cancelled {
            debug!(device_id = %device.id, "Device not started, run cancelled");
        } else {
            warn!(device_id = %device.id, name = %device.name, error = %error, "Skipping device");
        }
        self.emit_event(EngineEvent::DeviceSkipped {
            device_id: device.id.clone(),
            kind: error.kind(),
            reason: error.to_string(),
        });
        SyncOutcome::skipped(device, target, &error)
    }

    fn fail(&self, device: &Device, target: &HostRecordTarget, attempts: u32, error: Error) -> SyncOutcome {
        error!(
            device_id = %device.id,
            fqdn = %target.fqdn,
            kind = %error.kind(),
            attempts,
            error = %error,
            "Device sync failed"
        );
        self.emit_event(EngineEvent::DeviceFailed {
            device_id: device.id.clone(),
            kind: error.kind(),
            error: error.to_string(),
            attempts,
        });
        SyncOutcome::failed(device, target, attempts, &error)
    }

    fn resolved(&self, outcome: SyncOutcome, dry_run: bool) -> SyncOutcome {
        let fqdn = outcome.fqdn.clone().unwrap_or_default();
        info!(
            device_id = %outcome.device_id,
            fqdn = %fqdn,
            action = ?outcome.action,
            changes = ?outcome.changes,
            dry_run,
            "Device resolved"
        );
        self.emit_event(EngineEvent::DeviceApplied {
            device_id: outcome.device_id.clone(),
            fqdn,
            action: outcome.action,
            dry_run,
        });
        outcome
    }

    /// Emit an engine event
    ///
    /// A full channel drops the event with a warning. A closed channel (nobody
    /// listening) is not an error.
    fn emit_event(&self, event: EngineEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.event_tx.try_send(event) {
            warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
        }
    }
}
