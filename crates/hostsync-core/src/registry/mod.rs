//! Plugin-based connector registry
//!
//! The registry allows inventory sources and IPAM sinks to be registered
//! dynamically at runtime, avoiding hardcoded if-else chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use hostsync_core::registry::ConnectorRegistry;
//!
//! let registry = ConnectorRegistry::new();
//!
//! // Each connector crate registers its factory
//! hostsync_inventory_wug::register(&registry);
//! hostsync_ipam_infoblox::register(&registry);
//!
//! // Create connectors from config
//! let source = registry.create_inventory_source(&config.inventory, &retry)?;
//! let sink = registry.create_ipam_sink(&config.ipam)?;
//! ```

use crate::config::{InventoryConfig, IpamConfig};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::traits::{InventorySource, InventorySourceFactory, IpamSink, IpamSinkFactory};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Connector registry for plugin-based source and sink creation
///
/// The registry maintains a map of connector type names to factory objects,
/// allowing dynamic instantiation based on configuration.
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Default)]
pub struct ConnectorRegistry {
    /// Registered inventory source factories
    inventory_sources: RwLock<HashMap<String, Box<dyn InventorySourceFactory>>>,

    /// Registered IPAM sink factories
    ipam_sinks: RwLock<HashMap<String, Box<dyn IpamSinkFactory>>>,
}

impl ConnectorRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an inventory source factory
    ///
    /// # Parameters
    ///
    /// - `name`: Source type name as it appears in config (e.g., "whatsup_gold")
    /// - `factory`: Factory object for creating source instances
    pub fn register_inventory_source(
        &self,
        name: impl Into<String>,
        factory: Box<dyn InventorySourceFactory>,
    ) {
        let mut sources = self
            .inventory_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        sources.insert(name.into(), factory);
    }

    /// Register an IPAM sink factory
    ///
    /// # Parameters
    ///
    /// - `name`: Sink type name as it appears in config (e.g., "infoblox")
    /// - `factory`: Factory object for creating sink instances
    pub fn register_ipam_sink(&self, name: impl Into<String>, factory: Box<dyn IpamSinkFactory>) {
        let mut sinks = self
            .ipam_sinks
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        sinks.insert(name.into(), factory);
    }

    /// Create an inventory source from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn InventorySource>)`: Created source instance
    /// - `Err(Error)`: If the source type is not registered or creation fails
    pub fn create_inventory_source(
        &self,
        config: &InventoryConfig,
        retry: &RetryPolicy,
    ) -> Result<Box<dyn InventorySource>> {
        let source_type = config.type_name();
        let sources = self
            .inventory_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = sources.get(source_type).ok_or_else(|| {
            Error::config(format!("Unknown inventory source type: {}", source_type))
        })?;

        factory.create(config, retry)
    }

    /// Create an IPAM sink from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn IpamSink>)`: Created sink instance
    /// - `Err(Error)`: If the sink type is not registered or creation fails
    pub fn create_ipam_sink(&self, config: &IpamConfig) -> Result<Box<dyn IpamSink>> {
        let sink_type = config.type_name();
        let sinks = self
            .ipam_sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = sinks
            .get(sink_type)
            .ok_or_else(|| Error::config(format!("Unknown IPAM sink type: {}", sink_type)))?;

        factory.create(config)
    }

    /// List all registered inventory source types
    pub fn list_inventory_sources(&self) -> Vec<String> {
        let sources = self
            .inventory_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = sources.keys().cloned().collect();
        names.sort();
        names
    }

    /// List all registered IPAM sink types
    pub fn list_ipam_sinks(&self) -> Vec<String> {
        let sinks = self
            .ipam_sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = sinks.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if an inventory source type is registered
    pub fn has_inventory_source(&self, name: &str) -> bool {
        self.inventory_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Check if an IPAM sink type is registered
    pub fn has_ipam_sink(&self, name: &str) -> bool {
        self.ipam_sinks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}
