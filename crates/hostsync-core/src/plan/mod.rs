//! Upsert planning
//!
//! Pure field-level diff between a [`HostRecordTarget`] and the record the
//! appliance currently stores. Both the dry-run path and
//! [`IpamSink::upsert_host_record`](crate::traits::IpamSink::upsert_host_record)
//! go through [`plan_upsert`], so a dry run reports exactly what an apply
//! would do against the same starting state.

use crate::mapping::PROVENANCE_ATTRS;
use crate::traits::{ExistingHostRecord, ExtAttrs, HostRecordTarget, UpsertAction};
use serde::{Deserialize, Serialize};

/// A host-record field that differs between target and stored state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangedField {
    Ipv4Addrs,
    Mac,
    Extattrs,
}

/// What an upsert would do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertPlan {
    /// No record exists; create the target as-is
    Create,
    /// A record exists and differs; replace it with `desired`
    Update {
        reference: String,
        /// Full state to send (foreign attributes merged in)
        desired: HostRecordTarget,
        changes: Vec<ChangedField>,
    },
    /// A record exists and already matches
    Unchanged { reference: String },
}

impl UpsertPlan {
    /// The action this plan results in
    pub fn action(&self) -> UpsertAction {
        match self {
            UpsertPlan::Create => UpsertAction::Created,
            UpsertPlan::Update { .. } => UpsertAction::Updated,
            UpsertPlan::Unchanged { .. } => UpsertAction::Unchanged,
        }
    }

    /// Reference of the existing record, if any
    pub fn reference(&self) -> Option<&str> {
        match self {
            UpsertPlan::Create => None,
            UpsertPlan::Update { reference, .. } | UpsertPlan::Unchanged { reference } => {
                Some(reference)
            }
        }
    }

    /// Fields that differ (empty unless `Update`)
    pub fn changes(&self) -> &[ChangedField] {
        match self {
            UpsertPlan::Update { changes, .. } => changes,
            _ => &[],
        }
    }
}

/// Merge the target's provenance attributes over the stored ones.
///
/// Only names in [`PROVENANCE_ATTRS`] are overwritten; every other stored
/// attribute is preserved verbatim. Nothing is ever removed.
pub fn merge_extattrs(stored: &ExtAttrs, target: &ExtAttrs) -> ExtAttrs {
    let mut merged = stored.clone();
    for (name, value) in target {
        if PROVENANCE_ATTRS.contains(&name.as_str()) {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

/// Decide between create, update and no-op
pub fn plan_upsert(target: &HostRecordTarget, existing: Option<&ExistingHostRecord>) -> UpsertPlan {
    let Some(existing) = existing else {
        return UpsertPlan::Create;
    };

    let mut changes = Vec::new();

    // Address set must be exactly the target address
    let addresses_match = !existing.ipv4_addrs.is_empty()
        && existing.ipv4_addrs.iter().all(|addr| *addr == target.ipv4);
    if !addresses_match {
        changes.push(ChangedField::Ipv4Addrs);
    }

    // A MAC is only managed when the inventory reports one
    if let Some(mac) = &target.mac
        && existing.mac.as_deref() != Some(mac.as_str())
    {
        changes.push(ChangedField::Mac);
    }

    let extattrs = merge_extattrs(&existing.extattrs, &target.extattrs);
    if extattrs != existing.extattrs {
        changes.push(ChangedField::Extattrs);
    }

    if changes.is_empty() {
        return UpsertPlan::Unchanged {
            reference: existing.reference.clone(),
        };
    }

    UpsertPlan::Update {
        reference: existing.reference.clone(),
        desired: HostRecordTarget {
            fqdn: target.fqdn.clone(),
            ipv4: target.ipv4,
            mac: target.mac.clone().or_else(|| existing.mac.clone()),
            extattrs,
        },
        changes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::ExtAttrValue;
    use std::net::Ipv4Addr;

    fn target() -> HostRecordTarget {
        let mut extattrs = ExtAttrs::new();
        extattrs.insert("WUG Device ID".into(), "D1".into());
        extattrs.insert("WUG Status".into(), "up".into());
        HostRecordTarget {
            fqdn: "server1.example.com".into(),
            ipv4: Ipv4Addr::new(192, 168, 1, 10),
            mac: None,
            extattrs,
        }
    }

    fn stored_from(target: &HostRecordTarget) -> ExistingHostRecord {
        ExistingHostRecord {
            reference: "record:host/abc:server1.example.com/default".into(),
            fqdn: target.fqdn.clone(),
            ipv4_addrs: vec![target.ipv4],
            mac: target.mac.clone(),
            extattrs: target.extattrs.clone(),
        }
    }

    #[test]
    fn absent_record_is_created() {
        assert_eq!(plan_upsert(&target(), None), UpsertPlan::Create);
    }

    #[test]
    fn matching_record_is_unchanged() {
        let target = target();
        let stored = stored_from(&target);
        let plan = plan_upsert(&target, Some(&stored));
        assert_eq!(plan.action(), UpsertAction::Unchanged);
        assert_eq!(plan.reference(), Some(stored.reference.as_str()));
    }

    #[test]
    fn foreign_attributes_do_not_trigger_update() {
        let target = target();
        let mut stored = stored_from(&target);
        stored
            .extattrs
            .insert("Site".into(), ExtAttrValue::from("DC1"));

        assert_eq!(plan_upsert(&target, Some(&stored)).action(), UpsertAction::Unchanged);
    }

    #[test]
    fn update_preserves_foreign_attributes() {
        let target = target();
        let mut stored = stored_from(&target);
        stored.extattrs.insert("Site".into(), "DC1".into());
        stored.extattrs.insert("WUG Status".into(), "down".into());

        match plan_upsert(&target, Some(&stored)) {
            UpsertPlan::Update {
                desired, changes, ..
            } => {
                assert_eq!(changes, vec![ChangedField::Extattrs]);
                assert_eq!(desired.extattrs["Site"], ExtAttrValue::from("DC1"));
                assert_eq!(desired.extattrs["WUG Status"], ExtAttrValue::from("up"));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn merge_only_overwrites_provenance_attributes() {
        let mut stored = ExtAttrs::new();
        stored.insert("Site".into(), "DC1".into());
        stored.insert("WUG Status".into(), "down".into());

        let mut target = ExtAttrs::new();
        target.insert("Site".into(), "DC9".into());
        target.insert("WUG Status".into(), "up".into());

        let merged = merge_extattrs(&stored, &target);
        assert_eq!(merged["Site"], ExtAttrValue::from("DC1"));
        assert_eq!(merged["WUG Status"], ExtAttrValue::from("up"));
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn address_drift_is_detected() {
        let target = target();
        let mut stored = stored_from(&target);
        stored.ipv4_addrs = vec![Ipv4Addr::new(192, 168, 1, 99)];
        assert_eq!(
            plan_upsert(&target, Some(&stored)).changes(),
            &[ChangedField::Ipv4Addrs]
        );

        // An extra address bound next to ours is also drift
        stored.ipv4_addrs = vec![target.ipv4, Ipv4Addr::new(10, 0, 0, 1)];
        assert_eq!(
            plan_upsert(&target, Some(&stored)).changes(),
            &[ChangedField::Ipv4Addrs]
        );
    }

    #[test]
    fn mac_only_compared_when_reported() {
        let mut target = target();
        let mut stored = stored_from(&target);
        stored.mac = Some("00:11:22:33:44:55".into());

        // Inventory has no MAC: stored one is left alone
        assert_eq!(plan_upsert(&target, Some(&stored)).action(), UpsertAction::Unchanged);

        target.mac = Some("66:77:88:99:aa:bb".into());
        match plan_upsert(&target, Some(&stored)) {
            UpsertPlan::Update {
                desired, changes, ..
            } => {
                assert_eq!(changes, vec![ChangedField::Mac]);
                assert_eq!(desired.mac.as_deref(), Some("66:77:88:99:aa:bb"));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn update_carries_stored_mac_when_inventory_has_none() {
        let target = target();
        let mut stored = stored_from(&target);
        stored.mac = Some("00:11:22:33:44:55".into());
        stored.ipv4_addrs = vec![Ipv4Addr::new(10, 1, 1, 1)];

        match plan_upsert(&target, Some(&stored)) {
            UpsertPlan::Update { desired, .. } => {
                assert_eq!(desired.mac.as_deref(), Some("00:11:22:33:44:55"));
            }
            other => panic!("expected update, got {other:?}"),
        }
    }
}
