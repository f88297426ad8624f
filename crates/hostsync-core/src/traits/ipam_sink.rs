// # IPAM Sink Trait
//
// Defines the interface for reading and writing host records on an IPAM
// appliance.
//
// ## Implementations
//
// - Infoblox WAPI: `hostsync-ipam-infoblox` crate
//
// ## Usage
//
// ```rust,ignore
// use hostsync_core::IpamSink;
//
// #[tokio::main]
// async fn main() -> anyhow::Result<()> {
//     let sink = /* IpamSink implementation */;
//     let target = /* HostRecordTarget from the mapping layer */;
//
//     let existing = sink.find_host_record(&target.fqdn).await?;
//     let outcome = sink.upsert_host_record(&target, existing.as_ref()).await?;
//     println!("{:?} {}", outcome.action, outcome.reference);
//
//     Ok(())
// }
// ```

use crate::plan::{ChangedField, UpsertPlan, plan_upsert};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Value of an extensible attribute
///
/// Infoblox attributes are typed; lists appear for multi-value definitions.
/// Any other shape is kept as raw JSON so it is written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtAttrValue {
    Integer(i64),
    Text(String),
    List(Vec<String>),
    Other(serde_json::Value),
}

impl From<&str> for ExtAttrValue {
    fn from(value: &str) -> Self {
        ExtAttrValue::Text(value.to_string())
    }
}

impl From<String> for ExtAttrValue {
    fn from(value: String) -> Self {
        ExtAttrValue::Text(value)
    }
}

impl From<i64> for ExtAttrValue {
    fn from(value: i64) -> Self {
        ExtAttrValue::Integer(value)
    }
}

impl std::fmt::Display for ExtAttrValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtAttrValue::Integer(v) => write!(f, "{v}"),
            ExtAttrValue::Text(v) => f.write_str(v),
            ExtAttrValue::List(v) => f.write_str(&v.join(",")),
            ExtAttrValue::Other(v) => write!(f, "{v}"),
        }
    }
}

/// Extensible attributes keyed by attribute name (ordered for stable output)
pub type ExtAttrs = BTreeMap<String, ExtAttrValue>;

/// Desired state of a host record, produced by the mapping layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecordTarget {
    /// Fully-qualified domain name
    pub fqdn: String,
    /// Bound IPv4 address
    pub ipv4: Ipv4Addr,
    /// MAC address in lowercase colon form
    pub mac: Option<String>,
    /// Extensible attributes, provenance attributes included
    pub extattrs: ExtAttrs,
}

/// A host record as currently stored on the appliance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingHostRecord {
    /// Opaque object reference assigned by the appliance
    pub reference: String,
    /// Fully-qualified domain name
    pub fqdn: String,
    /// Every IPv4 address bound to the record
    pub ipv4_addrs: Vec<Ipv4Addr>,
    /// MAC bound to the first address, lowercase colon form
    pub mac: Option<String>,
    /// Extensible attributes as stored
    pub extattrs: ExtAttrs,
}

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Updated,
    Unchanged,
}

/// Result of [`IpamSink::upsert_host_record`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub action: UpsertAction,
    /// Reference of the created, updated or untouched record
    pub reference: String,
    /// Fields that differed (empty unless `Updated`)
    pub changes: Vec<ChangedField>,
}

/// Trait for IPAM sink implementations
///
/// Implementations provide the three wire primitives (find, create, update);
/// the create/update/unchanged decision lives in [`plan_upsert`] and is
/// executed by the provided [`upsert_host_record`](IpamSink::upsert_host_record).
///
/// # Error Contract
///
/// - `Error::Auth`: credentials rejected
/// - `Error::Transient`: network failure, 429 or 5xx (the engine retries)
/// - `Error::Conflict`: the appliance reports a data conflict such as an
///   address already bound to another record; never retried
/// - `Error::Validation`: the appliance rejected the payload
/// - `Error::Protocol`: unexpected response shape
///
/// Implementations must not retry on their own; retry policy is owned by the
/// engine.
#[async_trait]
pub trait IpamSink: Send + Sync {
    /// Look up the host record with the given FQDN
    async fn find_host_record(
        &self,
        fqdn: &str,
    ) -> Result<Option<ExistingHostRecord>, crate::Error>;

    /// Create a host record carrying the full target state; returns the
    /// reference assigned by the appliance
    async fn create_host_record(&self, target: &HostRecordTarget) -> Result<String, crate::Error>;

    /// Replace the state of an existing record with `desired`; returns the
    /// (possibly new) reference
    async fn update_host_record(
        &self,
        reference: &str,
        desired: &HostRecordTarget,
    ) -> Result<String, crate::Error>;

    /// Create-if-absent, update-if-different, no-op-if-unchanged
    ///
    /// Issues at most one write. When the plan is `Unchanged` no request is
    /// made at all.
    async fn upsert_host_record(
        &self,
        target: &HostRecordTarget,
        existing: Option<&ExistingHostRecord>,
    ) -> Result<UpsertOutcome, crate::Error> {
        match plan_upsert(target, existing) {
            UpsertPlan::Create => {
                let reference = self.create_host_record(target).await?;
                Ok(UpsertOutcome {
                    action: UpsertAction::Created,
                    reference,
                    changes: Vec::new(),
                })
            }
            UpsertPlan::Update {
                reference,
                desired,
                changes,
            } => {
                let reference = self.update_host_record(&reference, &desired).await?;
                Ok(UpsertOutcome {
                    action: UpsertAction::Updated,
                    reference,
                    changes,
                })
            }
            UpsertPlan::Unchanged { reference } => Ok(UpsertOutcome {
                action: UpsertAction::Unchanged,
                reference,
                changes: Vec::new(),
            }),
        }
    }

    /// Get the sink name (for logging/debugging)
    fn sink_name(&self) -> &'static str;
}

/// Helper trait for constructing IPAM sinks from configuration
pub trait IpamSinkFactory: Send + Sync {
    /// Create an IpamSink instance from configuration
    fn create(
        &self,
        config: &crate::config::IpamConfig,
    ) -> Result<Box<dyn IpamSink>, crate::Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ext_attr_value_untagged_json() {
        let attrs: ExtAttrs = serde_json::from_value(serde_json::json!({
            "Rack": 12,
            "Site": "DC1",
            "Tags": ["a", "b"],
        }))
        .unwrap();

        assert_eq!(attrs["Rack"], ExtAttrValue::Integer(12));
        assert_eq!(attrs["Site"], ExtAttrValue::from("DC1"));
        assert_eq!(attrs["Tags"].to_string(), "a,b");
    }

    #[test]
    fn unrecognised_values_round_trip_unchanged() {
        let raw = serde_json::json!({
            "Ports": [80, 443],
            "Weight": 1.5,
            "Owner": { "team": "netops" },
        });
        let attrs: ExtAttrs = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(attrs.len(), 3);
        assert_eq!(
            attrs["Ports"],
            ExtAttrValue::Other(serde_json::json!([80, 443]))
        );
        assert_eq!(serde_json::to_value(&attrs).unwrap(), raw);
    }
}
