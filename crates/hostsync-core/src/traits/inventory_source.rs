// # Inventory Source Trait
//
// Defines the interface for pulling device inventory from a monitoring
// platform.
//
// ## Implementations
//
// - WhatsUp Gold: `hostsync-inventory-wug` crate
//
// ## Usage
//
// ```rust,ignore
// use hostsync_core::InventorySource;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let source = /* InventorySource implementation */;
//
//     // Fetch at most 50 devices
//     for device in source.fetch_devices(Some(50)).await? {
//         println!("{} {} {}", device.id, device.name, device.ip_address);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Operational status reported by the monitoring platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Up,
    Down,
    Maintenance,
    #[default]
    Unknown,
}

impl DeviceStatus {
    /// Lowercase name, as stored in provenance attributes
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Up => "up",
            DeviceStatus::Down => "down",
            DeviceStatus::Maintenance => "maintenance",
            DeviceStatus::Unknown => "unknown",
        }
    }

    /// Lenient parse: case-insensitive, anything unrecognized is `Unknown`
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or(DeviceStatus::Unknown)
    }
}

impl FromStr for DeviceStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "up" => Ok(DeviceStatus::Up),
            "down" => Ok(DeviceStatus::Down),
            "maintenance" => Ok(DeviceStatus::Maintenance),
            "unknown" => Ok(DeviceStatus::Unknown),
            other => Err(crate::Error::validation(format!(
                "unrecognized device status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical device record, normalized from the monitoring platform
///
/// The address is kept as reported; the mapping layer decides whether it is
/// usable. Devices are immutable once fetched within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// External device identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Primary IPv4 address, raw text (may be empty or invalid)
    pub ip_address: String,
    /// Operational status
    pub status: DeviceStatus,
    /// MAC address, raw text
    pub mac_address: Option<String>,
    /// Device group the record was listed under
    pub group: Option<String>,
}

impl Device {
    /// Create a device with `Unknown` status and no MAC
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        ip_address: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ip_address: ip_address.into(),
            status: DeviceStatus::Unknown,
            mac_address: None,
            group: None,
        }
    }

    /// Set the status
    pub fn with_status(mut self, status: DeviceStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the MAC address
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac_address = Some(mac.into());
        self
    }

    /// Set the device group
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }
}

/// Trait for inventory source implementations
///
/// # Error Contract
///
/// - `Error::Auth`: credentials invalid or token expired (after at most one
///   refresh per client lifetime)
/// - `Error::Transient`: network failure, 429 or 5xx after the retry policy
///   was exhausted
/// - `Error::Protocol`: malformed response; never retried
///
/// Any error returned here is fatal for the whole sync run: the engine never
/// works on a partial inventory.
///
/// # Thread Safety
///
/// Implementations must be usable across async tasks. They may hold an
/// authentication token but no other state between calls.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// Fetch up to `limit` devices (all devices when `None`), in the order the
    /// platform lists them
    async fn fetch_devices(&self, limit: Option<usize>) -> Result<Vec<Device>, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

/// Helper trait for constructing inventory sources from configuration
pub trait InventorySourceFactory: Send + Sync {
    /// Create an InventorySource instance from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Configuration specific to this source
    /// - `retry`: Retry policy to wrap every outbound request in
    fn create(
        &self,
        config: &crate::config::InventoryConfig,
        retry: &crate::retry::RetryPolicy,
    ) -> Result<Box<dyn InventorySource>, crate::Error>;
}
