//! Sync result types

use crate::error::{Error, ErrorKind};
use crate::plan::ChangedField;
use crate::traits::{Device, HostRecordTarget, UpsertAction};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

/// Whether a run may write to the IPAM appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Compute what would change; never write
    DryRun,
    /// Create and update host records
    Apply,
}

impl SyncMode {
    pub fn is_dry_run(&self) -> bool {
        matches!(self, SyncMode::DryRun)
    }
}

/// Per-device result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Created,
    Updated,
    Unchanged,
    Skipped,
    Failed,
}

impl From<UpsertAction> for SyncAction {
    fn from(action: UpsertAction) -> Self {
        match action {
            UpsertAction::Created => SyncAction::Created,
            UpsertAction::Updated => SyncAction::Updated,
            UpsertAction::Unchanged => SyncAction::Unchanged,
        }
    }
}

/// Classification and message of a skip or failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for OutcomeError {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// What happened to one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub device_id: String,
    pub device_name: String,
    /// Present when mapping succeeded
    pub fqdn: Option<String>,
    /// Present when mapping succeeded
    pub ipv4: Option<Ipv4Addr>,
    pub action: SyncAction,
    /// Fields that differ (updates only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ChangedField>,
    /// IPAM reference, when known
    pub reference: Option<String>,
    /// Attempts spent on the operation that decided the outcome
    pub attempts: u32,
    pub error: Option<OutcomeError>,
}

impl SyncOutcome {
    pub(crate) fn skipped(device: &Device, target: Option<&HostRecordTarget>, error: &Error) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(device, target, SyncAction::Skipped, 0)
        }
    }

    pub(crate) fn failed(
        device: &Device,
        target: &HostRecordTarget,
        attempts: u32,
        error: &Error,
    ) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::base(device, Some(target), SyncAction::Failed, attempts)
        }
    }

    pub(crate) fn resolved(
        device: &Device,
        target: &HostRecordTarget,
        action: UpsertAction,
        reference: Option<String>,
        changes: Vec<ChangedField>,
        attempts: u32,
    ) -> Self {
        Self {
            reference,
            changes,
            ..Self::base(device, Some(target), action.into(), attempts)
        }
    }

    fn base(
        device: &Device,
        target: Option<&HostRecordTarget>,
        action: SyncAction,
        attempts: u32,
    ) -> Self {
        Self {
            device_id: device.id.clone(),
            device_name: device.name.clone(),
            fqdn: target.map(|t| t.fqdn.clone()),
            ipv4: target.map(|t| t.ipv4),
            action,
            changes: Vec::new(),
            reference: None,
            attempts,
            error: None,
        }
    }

    /// Whether the device was left alone because the run was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.error
            .as_ref()
            .is_some_and(|e| e.kind == ErrorKind::Cancelled)
    }
}

/// Aggregate counts for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    /// Devices returned by the inventory
    pub discovered: usize,
    /// Devices work was started on (everything except cancelled ones)
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncCounts {
    /// Tally outcomes
    pub fn from_outcomes(discovered: usize, outcomes: &[SyncOutcome]) -> Self {
        let mut counts = SyncCounts {
            discovered,
            ..Default::default()
        };
        for outcome in outcomes {
            if !outcome.is_cancelled() {
                counts.processed += 1;
            }
            match outcome.action {
                SyncAction::Created => counts.created += 1,
                SyncAction::Updated => counts.updated += 1,
                SyncAction::Unchanged => counts.unchanged += 1,
                SyncAction::Skipped => counts.skipped += 1,
                SyncAction::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

/// Result of one sync invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub dry_run: bool,
    /// The run was cancelled before every device was started
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub counts: SyncCounts,
    /// One entry per device, in inventory order
    pub outcomes: Vec<SyncOutcome>,
}

impl SyncResult {
    /// Outcome for a device id
    pub fn outcome(&self, device_id: &str) -> Option<&SyncOutcome> {
        self.outcomes.iter().find(|o| o.device_id == device_id)
    }
}
