//! Device to host-record mapping
//!
//! [`map_device`] is a pure function: the same device and zone always produce
//! the same [`HostRecordTarget`], which is what makes repeated syncs
//! idempotent.

use crate::config::MappingConfig;
use crate::error::{Error, Result};
use crate::traits::{Device, ExtAttrs, HostRecordTarget};
use std::net::Ipv4Addr;
use tracing::warn;

/// Provenance attribute: originating system
pub const ATTR_SOURCE: &str = "Source";

/// Provenance attribute: originating device identifier
pub const ATTR_DEVICE_ID: &str = "WUG Device ID";

/// Provenance attribute: originating operational status
pub const ATTR_DEVICE_STATUS: &str = "WUG Status";

/// Value of [`ATTR_SOURCE`]
pub const SOURCE_NAME: &str = "WhatsUpGold";

/// Attributes owned by this system; everything else on a record is foreign
pub const PROVENANCE_ATTRS: [&str; 3] = [ATTR_SOURCE, ATTR_DEVICE_ID, ATTR_DEVICE_STATUS];

const MAX_LABEL_LEN: usize = 63;
const MAX_FQDN_LEN: usize = 253;

/// Map a device into the desired host-record state
///
/// Fails with `Error::Validation` when the address is missing or unusable or
/// the name normalizes to nothing.
pub fn map_device(device: &Device, config: &MappingConfig) -> Result<HostRecordTarget> {
    let ipv4 = parse_ipv4(&device.ip_address)
        .map_err(|e| Error::validation(format!("device {}: {}", device.id, e)))?;
    let fqdn = build_fqdn(&device.name, &config.zone)
        .map_err(|e| Error::validation(format!("device {}: {}", device.id, e)))?;

    let mac = device.mac_address.as_deref().and_then(|raw| {
        let normalized = normalize_mac(raw);
        if normalized.is_none() {
            warn!(device_id = %device.id, mac = raw, "Ignoring unparseable MAC address");
        }
        normalized
    });

    let mut extattrs = ExtAttrs::new();
    extattrs.insert(ATTR_SOURCE.to_string(), SOURCE_NAME.into());
    extattrs.insert(ATTR_DEVICE_ID.to_string(), device.id.clone().into());
    extattrs.insert(ATTR_DEVICE_STATUS.to_string(), device.status.as_str().into());

    Ok(HostRecordTarget {
        fqdn,
        ipv4,
        mac,
        extattrs,
    })
}

/// Parse a host address, rejecting values that cannot be bound to a record
fn parse_ipv4(raw: &str) -> std::result::Result<Ipv4Addr, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("missing IPv4 address".to_string());
    }

    let ip: Ipv4Addr = raw
        .parse()
        .map_err(|_| format!("invalid IPv4 address '{raw}'"))?;

    if ip.is_unspecified() || ip.is_broadcast() || ip.is_multicast() {
        return Err(format!("IPv4 address {ip} cannot be bound to a host"));
    }

    Ok(ip)
}

/// Normalize a device name into DNS labels and append the zone
///
/// A name that already ends in the zone is not suffixed twice.
pub fn build_fqdn(name: &str, zone: &str) -> std::result::Result<String, String> {
    let zone = zone.trim().trim_matches('.').to_ascii_lowercase();
    let host = normalize_name(name);
    if host.is_empty() {
        return Err(format!("name '{name}' has no usable DNS characters"));
    }

    let fqdn = if host == zone || host.ends_with(&format!(".{zone}")) {
        host
    } else {
        format!("{host}.{zone}")
    };

    if fqdn.len() > MAX_FQDN_LEN {
        return Err(format!(
            "FQDN too long: {} chars (max {MAX_FQDN_LEN})",
            fqdn.len()
        ));
    }

    Ok(fqdn)
}

fn normalize_name(name: &str) -> String {
    let lowered: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() || c == '_' { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '.')
        .collect();

    lowered
        .split('.')
        .map(|label| {
            let label = label.trim_matches('-');
            let label = &label[..label.len().min(MAX_LABEL_LEN)];
            label.trim_end_matches('-')
        })
        .filter(|label| !label.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

/// Normalize colon, dash or dotted MAC notation to `aa:bb:cc:dd:ee:ff`
pub fn normalize_mac(raw: &str) -> Option<String> {
    let hex: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();

    if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let hex = hex.to_ascii_lowercase();
    let octets: Vec<&str> = (0..6).map(|i| &hex[i * 2..i * 2 + 2]).collect();
    Some(octets.join(":"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{DeviceStatus, ExtAttrValue};

    fn zone() -> MappingConfig {
        MappingConfig::new("example.com")
    }

    #[test]
    fn maps_scenario_device() {
        let device = Device::new("D1", "server1", "192.168.1.10").with_status(DeviceStatus::Up);
        let target = map_device(&device, &zone()).unwrap();

        assert_eq!(target.fqdn, "server1.example.com");
        assert_eq!(target.ipv4, Ipv4Addr::new(192, 168, 1, 10));
        assert_eq!(target.extattrs[ATTR_DEVICE_ID], ExtAttrValue::from("D1"));
        assert_eq!(target.extattrs[ATTR_DEVICE_STATUS], ExtAttrValue::from("up"));
        assert_eq!(target.extattrs[ATTR_SOURCE], ExtAttrValue::from(SOURCE_NAME));
    }

    #[test]
    fn mapping_is_stable() {
        let device = Device::new("42", "Core Switch_01", "10.0.0.1")
            .with_status(DeviceStatus::Down)
            .with_mac("00-1A-2B-3C-4D-5E");

        let first = map_device(&device, &zone()).unwrap();
        let second = map_device(&device, &zone()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.fqdn, "core-switch-01.example.com");
        assert_eq!(first.mac.as_deref(), Some("00:1a:2b:3c:4d:5e"));
    }

    #[test]
    fn rejects_unusable_addresses() {
        for raw in ["", "   ", "not-an-ip", "300.1.1.1", "0.0.0.0", "255.255.255.255", "224.0.0.1", "fe80::1"] {
            let device = Device::new("D9", "host", raw);
            let err = map_device(&device, &zone()).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Validation, "address {raw:?}");
        }
    }

    #[test]
    fn rejects_names_without_dns_characters() {
        let device = Device::new("D9", "***", "10.0.0.1");
        assert!(map_device(&device, &zone()).is_err());
    }

    #[test]
    fn name_normalization() {
        assert_eq!(build_fqdn("  Web Server  ", "example.com").unwrap(), "web-server.example.com");
        assert_eq!(build_fqdn("db#1!", "example.com").unwrap(), "db1.example.com");
        assert_eq!(build_fqdn("-edge-.", "example.com").unwrap(), "edge.example.com");
        assert_eq!(build_fqdn("sw1.site", "example.com").unwrap(), "sw1.site.example.com");
        assert_eq!(build_fqdn("SW1.Example.COM", "example.com").unwrap(), "sw1.example.com");
        assert_eq!(build_fqdn("host", ".Example.com.").unwrap(), "host.example.com");
    }

    #[test]
    fn long_labels_are_truncated() {
        let name = "a".repeat(80);
        let fqdn = build_fqdn(&name, "example.com").unwrap();
        assert_eq!(fqdn.split('.').next().unwrap().len(), 63);
    }

    #[test]
    fn overlong_fqdn_is_rejected() {
        let name = vec!["abcdefghij"; 30].join(".");
        assert!(build_fqdn(&name, "example.com").is_err());
    }

    #[test]
    fn mac_normalization() {
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE:FF").as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(normalize_mac("aabb.ccdd.eeff").as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(normalize_mac("aa-bb-cc-dd-ee-ff").as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(normalize_mac("aa:bb:cc"), None);
        assert_eq!(normalize_mac("zz:bb:cc:dd:ee:ff"), None);
    }

    #[test]
    fn invalid_mac_is_dropped_not_fatal() {
        let device = Device::new("D2", "printer", "10.0.0.7").with_mac("garbage");
        let target = map_device(&device, &zone()).unwrap();
        assert!(target.mac.is_none());
    }
}
