// # hostsync-core
//
// Core library for syncing a monitoring inventory into IPAM host records.
//
// ## Architecture Overview
//
// This library provides the core functionality for one-shot inventory sync:
// - **InventorySource**: Trait for pulling devices from a monitoring platform
// - **IpamSink**: Trait for finding, creating and updating host records
// - **map_device**: Pure device → host-record mapping
// - **plan_upsert**: Pure create/update/unchanged decision
// - **SyncEngine**: Core engine that orchestrates fetch → map → find → upsert
// - **ConnectorRegistry**: Plugin-based registry for sources and sinks
//
// ## Design Principles
//
// 1. **Separation of Concerns**: Core logic is separate from wire clients
// 2. **Stateless**: The IPAM appliance is queried fresh on every run
// 3. **Plugin-Based**: Connectors are registered dynamically, no hard-coded if-else
// 4. **Library-First**: All core functionality can be used as a library
// 5. **Idempotency**: Repeating a run against converged state writes nothing

pub mod config;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod plan;
pub mod registry;
pub mod retry;
pub mod traits;

// Re-export core types for convenience
pub use config::{
    Credentials, EngineConfig, InventoryAuthMode, InventoryConfig, IpamConfig, MappingConfig,
    SyncConfig,
};
pub use engine::{
    CancelHandle, CancelSignal, EngineEvent, SyncAction, SyncCounts, SyncEngine, SyncMode,
    SyncOutcome, SyncResult,
};
pub use error::{Error, ErrorKind, Result};
pub use mapping::map_device;
pub use plan::{ChangedField, UpsertPlan, plan_upsert};
pub use registry::ConnectorRegistry;
pub use retry::RetryPolicy;
pub use traits::{
    Device, DeviceStatus, ExistingHostRecord, ExtAttrValue, ExtAttrs, HostRecordTarget,
    InventorySource, IpamSink, UpsertAction, UpsertOutcome,
};
