//! Environment configuration for the daemon
//!
//! Every setting comes from an environment variable; see the crate header in
//! `main.rs` for the full list. Values are read through a lookup function so
//! tests can supply a map instead of the process environment.

use anyhow::{Context, Result};
use hostsync_core::config::{
    Credentials, EngineConfig, InventoryAuthMode, InventoryConfig, IpamConfig, MappingConfig,
    SyncConfig,
};
use std::str::FromStr;
use std::time::Duration;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for a whole sync run
    pub run_timeout: Duration,
    pub log_level: String,
    pub sync: SyncConfig,
}

impl DaemonConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let verify_tls = vars.bool("SYNC_VERIFY_SSL", false)?;
        let timeout_secs = vars.parse("SYNC_TIMEOUT_SECONDS", 30u64)?;

        let inventory = InventoryConfig::WhatsUpGold {
            base_url: vars.required("WUG_BASE_URL")?,
            credentials: Credentials::new(
                vars.required("WUG_USERNAME")?,
                vars.required("WUG_PASSWORD")?,
            ),
            auth: vars.parse("WUG_AUTH_MODE", InventoryAuthMode::Token)?,
            token_endpoint: vars.string("WUG_TOKEN_ENDPOINT", "/api/v1/token"),
            devices_endpoint: vars.string(
                "WUG_DEVICES_ENDPOINT",
                "/api/v1/device-groups/-/devices/-",
            ),
            page_size: vars.parse("WUG_PAGE_SIZE", 500usize)?,
            verify_tls,
            timeout_secs,
        };

        let ipam = IpamConfig::Infoblox {
            base_url: vars.required("INFOBLOX_BASE_URL")?,
            credentials: Credentials::new(
                vars.required("INFOBLOX_USERNAME")?,
                vars.required("INFOBLOX_PASSWORD")?,
            ),
            wapi_version: vars.string("INFOBLOX_WAPI_VERSION", "v2.12.3"),
            dns_view: vars.string("INFOBLOX_DNS_VIEW", "default"),
            verify_tls,
            timeout_secs,
        };

        let defaults = EngineConfig::default();
        let engine = EngineConfig {
            max_attempts: vars.parse("SYNC_MAX_ATTEMPTS", defaults.max_attempts)?,
            retry_base_delay_ms: vars.parse("SYNC_RETRY_BASE_MS", defaults.retry_base_delay_ms)?,
            retry_max_delay_ms: vars.parse("SYNC_RETRY_MAX_MS", defaults.retry_max_delay_ms)?,
            concurrency: vars.parse("SYNC_CONCURRENCY", defaults.concurrency)?,
            ..defaults
        };

        Ok(Self {
            host: vars.string("SYNC_HOST", "0.0.0.0"),
            port: vars.parse("SYNC_PORT", 8080u16)?,
            run_timeout: Duration::from_secs(vars.parse("SYNC_RUN_TIMEOUT_SECONDS", 300u64)?),
            log_level: vars.string("SYNC_LOG_LEVEL", "info"),
            sync: SyncConfig {
                inventory,
                ipam,
                mapping: MappingConfig::new(vars.required("SYNC_DNS_ZONE")?),
                engine,
            },
        })
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.sync
            .validate()
            .context("Invalid sync configuration")?;

        if self.run_timeout.is_zero() {
            anyhow::bail!("SYNC_RUN_TIMEOUT_SECONDS must be greater than 0");
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "SYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Socket address string to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

struct Vars<'a, F>(&'a F);

impl<F> Vars<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &str) -> Result<String> {
        self.get(name)
            .with_context(|| format!("{name} is required. Set it via: export {name}=..."))
    }

    fn string(&self, name: &str, default: &str) -> String {
        self.get(name).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, name: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .parse()
                .map_err(|e| anyhow::anyhow!("{name} has invalid value '{raw}': {e}")),
            None => Ok(default),
        }
    }

    fn bool(&self, name: &str, default: bool) -> Result<bool> {
        match self.get(name) {
            Some(raw) => parse_bool(&raw)
                .with_context(|| format!("{name} must be a boolean (1/0, true/false, yes/no, on/off), got '{raw}'")),
            None => Ok(default),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
