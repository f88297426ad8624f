//! Configuration types for the hostsync system
//!
//! This module defines all configuration structures used throughout the crate.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Main sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Inventory source configuration
    pub inventory: InventoryConfig,

    /// IPAM sink configuration
    pub ipam: IpamConfig,

    /// Device to host-record mapping
    pub mapping: MappingConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl SyncConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.inventory.validate()?;
        self.ipam.validate()?;
        self.mapping.validate()?;
        self.engine.validate()?;

        Ok(())
    }
}

/// Username/password pair for basic or token authentication
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Create a credential pair
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    fn validate(&self, service: &str) -> Result<(), crate::Error> {
        if self.username.is_empty() {
            return Err(crate::Error::config(format!(
                "{service} username cannot be empty"
            )));
        }
        if self.password.is_empty() {
            return Err(crate::Error::config(format!(
                "{service} password cannot be empty"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How the inventory client authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InventoryAuthMode {
    /// Exchange credentials for a bearer token
    #[default]
    Token,
    /// Send HTTP basic credentials on every request
    Basic,
}

impl FromStr for InventoryAuthMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(InventoryAuthMode::Token),
            "basic" => Ok(InventoryAuthMode::Basic),
            other => Err(crate::Error::config(format!(
                "unknown inventory auth mode '{other}' (expected token or basic)"
            ))),
        }
    }
}

/// Inventory source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InventoryConfig {
    /// WhatsUp Gold REST API
    #[serde(rename = "whatsup_gold")]
    WhatsUpGold {
        /// Base URL, e.g. `https://wug.example.com:9644`
        base_url: String,
        credentials: Credentials,
        #[serde(default)]
        auth: InventoryAuthMode,
        /// Path of the token endpoint
        #[serde(default = "default_wug_token_endpoint")]
        token_endpoint: String,
        /// Path of the device listing endpoint
        #[serde(default = "default_wug_devices_endpoint")]
        devices_endpoint: String,
        /// Devices requested per page
        #[serde(default = "default_page_size")]
        page_size: usize,
        #[serde(default)]
        verify_tls: bool,
        /// Per-request timeout in seconds
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom inventory source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl InventoryConfig {
    /// WhatsUp Gold config with every optional field at its default
    pub fn whatsup_gold(base_url: impl Into<String>, credentials: Credentials) -> Self {
        InventoryConfig::WhatsUpGold {
            base_url: base_url.into(),
            credentials,
            auth: InventoryAuthMode::default(),
            token_endpoint: default_wug_token_endpoint(),
            devices_endpoint: default_wug_devices_endpoint(),
            page_size: default_page_size(),
            verify_tls: false,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Validate the inventory configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            InventoryConfig::WhatsUpGold {
                base_url,
                credentials,
                page_size,
                timeout_secs,
                ..
            } => {
                validate_base_url("WhatsUp Gold", base_url)?;
                credentials.validate("WhatsUp Gold")?;
                if *page_size == 0 {
                    return Err(crate::Error::config("WhatsUp Gold page size must be > 0"));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("WhatsUp Gold timeout must be > 0"));
                }
                Ok(())
            }
            InventoryConfig::Custom { factory, config } => {
                validate_custom("inventory source", factory, config)
            }
        }
    }

    /// Get the inventory source type name
    pub fn type_name(&self) -> &str {
        match self {
            InventoryConfig::WhatsUpGold { .. } => "whatsup_gold",
            InventoryConfig::Custom { factory, .. } => factory,
        }
    }
}

/// IPAM sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpamConfig {
    /// Infoblox WAPI
    Infoblox {
        /// Grid master URL, e.g. `https://gm.example.com`
        base_url: String,
        credentials: Credentials,
        /// WAPI version segment, e.g. `v2.12.3`
        #[serde(default = "default_wapi_version")]
        wapi_version: String,
        /// DNS view host records live in
        #[serde(default = "default_dns_view")]
        dns_view: String,
        #[serde(default)]
        verify_tls: bool,
        /// Per-request timeout in seconds
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },

    /// Custom IPAM sink
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl IpamConfig {
    /// Infoblox config with every optional field at its default
    pub fn infoblox(base_url: impl Into<String>, credentials: Credentials) -> Self {
        IpamConfig::Infoblox {
            base_url: base_url.into(),
            credentials,
            wapi_version: default_wapi_version(),
            dns_view: default_dns_view(),
            verify_tls: false,
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Validate the IPAM configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            IpamConfig::Infoblox {
                base_url,
                credentials,
                wapi_version,
                dns_view,
                timeout_secs,
                ..
            } => {
                validate_base_url("Infoblox", base_url)?;
                credentials.validate("Infoblox")?;
                if !wapi_version.starts_with('v') {
                    return Err(crate::Error::config(format!(
                        "Infoblox WAPI version must look like v2.12.3, got '{wapi_version}'"
                    )));
                }
                if dns_view.is_empty() {
                    return Err(crate::Error::config("Infoblox DNS view cannot be empty"));
                }
                if *timeout_secs == 0 {
                    return Err(crate::Error::config("Infoblox timeout must be > 0"));
                }
                Ok(())
            }
            IpamConfig::Custom { factory, config } => validate_custom("IPAM sink", factory, config),
        }
    }

    /// Get the IPAM sink type name
    pub fn type_name(&self) -> &str {
        match self {
            IpamConfig::Infoblox { .. } => "infoblox",
            IpamConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Device to host-record mapping configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// DNS zone appended to device names (e.g. "example.com")
    pub zone: String,
}

impl MappingConfig {
    /// Create a mapping configuration; surrounding dots and case are normalized
    pub fn new(zone: impl Into<String>) -> Self {
        let zone = zone.into();
        Self {
            zone: zone.trim().trim_matches('.').to_ascii_lowercase(),
        }
    }

    /// Validate the mapping configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        let zone = self.zone.trim().trim_matches('.');
        if zone.is_empty() {
            return Err(crate::Error::config("DNS zone cannot be empty"));
        }
        let valid = zone.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
        if !valid {
            return Err(crate::Error::config(format!("invalid DNS zone '{zone}'")));
        }
        Ok(())
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Total attempts per remote operation, first attempt included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (in milliseconds)
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Upper bound for the retry delay (in milliseconds)
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Randomize retry delays
    #[serde(default = "default_retry_jitter")]
    pub retry_jitter: bool,

    /// Devices processed in parallel
    ///
    /// Outcomes are reported in inventory order regardless of this value.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Capacity of the engine event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Retry policy derived from these settings
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
            jitter: self.retry_jitter,
        }
    }

    /// Validate the engine configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.max_attempts == 0 {
            return Err(crate::Error::config("max_attempts must be >= 1"));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(crate::Error::config(
                "retry_max_delay_ms must be >= retry_base_delay_ms",
            ));
        }
        if self.concurrency == 0 {
            return Err(crate::Error::config("concurrency must be >= 1"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("event_channel_capacity must be >= 1"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_jitter: default_retry_jitter(),
            concurrency: default_concurrency(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn validate_base_url(service: &str, base_url: &str) -> Result<(), crate::Error> {
    if base_url.is_empty() {
        return Err(crate::Error::config(format!(
            "{service} base URL cannot be empty"
        )));
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(crate::Error::config(format!(
            "{service} base URL must start with http:// or https://, got '{base_url}'"
        )));
    }
    Ok(())
}

fn validate_custom(
    what: &str,
    factory: &str,
    config: &serde_json::Value,
) -> Result<(), crate::Error> {
    if factory.is_empty() {
        return Err(crate::Error::config(format!(
            "Custom {what} factory cannot be empty"
        )));
    }
    if config.is_null() {
        return Err(crate::Error::config(format!(
            "Custom {what} config cannot be null"
        )));
    }
    Ok(())
}

fn default_wug_token_endpoint() -> String {
    "/api/v1/token".to_string()
}

fn default_wug_devices_endpoint() -> String {
    "/api/v1/device-groups/-/devices/-".to_string()
}

fn default_page_size() -> usize {
    500
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_wapi_version() -> String {
    "v2.12.3".to_string()
}

fn default_dns_view() -> String {
    "default".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

fn default_retry_jitter() -> bool {
    true
}

fn default_concurrency() -> usize {
    1
}

fn default_event_channel_capacity() -> usize {
    1000
}
