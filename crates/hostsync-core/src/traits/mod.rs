//! Core traits for the hostsync system
//!
//! This module defines the abstract interfaces that all implementations must follow.
//!
//! - [`InventorySource`]: Pull device inventory from a monitoring platform
//! - [`IpamSink`]: Find, create and update host records on an IPAM appliance

pub mod inventory_source;
pub mod ipam_sink;

pub use inventory_source::{Device, DeviceStatus, InventorySource, InventorySourceFactory};
pub use ipam_sink::{
    ExistingHostRecord, ExtAttrValue, ExtAttrs, HostRecordTarget, IpamSink, IpamSinkFactory,
    UpsertAction, UpsertOutcome,
};
