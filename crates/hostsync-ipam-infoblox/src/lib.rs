// # Infoblox IPAM Sink
//
// This crate provides the Infoblox WAPI implementation of `IpamSink`.
//
// ## Behaviour
//
// - One HTTP request per primitive (find, create, update)
// - Full error propagation to the engine, classified by status and WAPI error
//   code (the engine owns retries and backoff)
// - Updates carry the full desired state, never a partial patch
// - Credentials never appear in logs or `Debug` output
//
// The create/update/unchanged decision is made by the provided
// `IpamSink::upsert_host_record`; this crate only speaks the wire protocol.
//
// ## API Reference
//
// - Base: `{base_url}/wapi/{wapi_version}`, HTTP Basic auth
// - Find: GET `/record:host?name=..&view=..&_return_fields=name,ipv4addrs,extattrs`
// - Create: POST `/record:host`
// - Update: PUT `/{_ref}`
//
// Extensible attributes travel as `{"<name>": {"value": <value>}}`.

use async_trait::async_trait;
use hostsync_core::config::{Credentials, IpamConfig};
use hostsync_core::mapping::normalize_mac;
use hostsync_core::traits::{
    ExistingHostRecord, ExtAttrValue, ExtAttrs, HostRecordTarget, IpamSink, IpamSinkFactory,
};
use hostsync_core::{ConnectorRegistry, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::net::Ipv4Addr;
use std::time::Duration;

const SERVICE: &str = "Infoblox";

/// Fields requested on every host-record read
const RETURN_FIELDS: &str = "name,ipv4addrs,extattrs";

/// MAC Infoblox reports for an address without a hardware binding
const NULL_MAC: &str = "00:00:00:00:00:00";

/// Infoblox WAPI client
///
/// Stateless apart from the reusable HTTP client. All coordination (retries,
/// backoff, scheduling) is owned by `SyncEngine`.
pub struct InfobloxClient {
    /// `{base_url}/wapi/{version}`, no trailing slash
    wapi_base: String,

    /// Basic auth credentials
    /// ⚠️ NEVER log the password
    credentials: Credentials,

    /// DNS view records are read from and created in
    dns_view: String,

    /// HTTP client for API requests
    client: reqwest::Client,
}

// Custom Debug implementation that hides the password
impl std::fmt::Debug for InfobloxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfobloxClient")
            .field("wapi_base", &self.wapi_base)
            .field("credentials", &self.credentials)
            .field("dns_view", &self.dns_view)
            .finish()
    }
}

#[derive(Serialize)]
struct Ipv4AddrPayload<'a> {
    ipv4addr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    mac: Option<&'a str>,
}

#[derive(Serialize)]
struct HostRecordPayload<'a> {
    name: &'a str,
    /// Only sent on create; the view of an existing record is immutable
    #[serde(skip_serializing_if = "Option::is_none")]
    view: Option<&'a str>,
    ipv4addrs: Vec<Ipv4AddrPayload<'a>>,
    extattrs: Value,
}

impl<'a> HostRecordPayload<'a> {
    fn new(target: &'a HostRecordTarget, view: Option<&'a str>) -> Self {
        Self {
            name: &target.fqdn,
            view,
            ipv4addrs: vec![Ipv4AddrPayload {
                ipv4addr: target.ipv4.to_string(),
                mac: target.mac.as_deref(),
            }],
            extattrs: encode_extattrs(&target.extattrs),
        }
    }
}

#[derive(Deserialize)]
struct HostRecordWire {
    #[serde(rename = "_ref")]
    reference: String,
    name: String,
    #[serde(default)]
    ipv4addrs: Vec<Ipv4AddrWire>,
    #[serde(default)]
    extattrs: Map<String, Value>,
}

#[derive(Deserialize)]
struct Ipv4AddrWire {
    ipv4addr: String,
    #[serde(default)]
    mac: Option<String>,
}

/// WAPI error body
#[derive(Debug, Default, Deserialize)]
struct WapiError {
    #[serde(rename = "Error", default)]
    error: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

impl InfobloxClient {
    /// Create a client from an `infoblox` IPAM configuration
    pub fn from_config(config: &IpamConfig) -> Result<Self> {
        let IpamConfig::Infoblox {
            base_url,
            credentials,
            wapi_version,
            dns_view,
            verify_tls,
            timeout_secs,
        } = config
        else {
            return Err(Error::config("Invalid config for Infoblox IPAM sink"));
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(*timeout_secs))
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            wapi_base: format!(
                "{}/wapi/{}",
                base_url.trim_end_matches('/'),
                wapi_version.trim_matches('/')
            ),
            credentials: credentials.clone(),
            dns_view: dns_view.clone(),
            client,
        })
    }

    fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.wapi_base, resource.trim_start_matches('/'))
    }

    /// Send a request with basic auth and return the JSON body of a 2xx response
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value> {
        let response = request
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;

        if !(200..300).contains(&status) {
            return Err(classify_failure(status, &body));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::protocol(format!("{SERVICE} returned invalid JSON: {e}")))
    }
}

#[async_trait]
impl IpamSink for InfobloxClient {
    /// Look up a host record by FQDN in the configured view
    ///
    /// # API Call
    ///
    /// ```http
    /// GET /wapi/v2.12.3/record:host?name=server1.example.com&view=default&_return_fields=name,ipv4addrs,extattrs&_max_results=1
    /// Authorization: Basic <credentials>
    /// ```
    async fn find_host_record(&self, fqdn: &str) -> Result<Option<ExistingHostRecord>> {
        tracing::debug!(fqdn, view = %self.dns_view, "Looking up Infoblox host record");

        let request = self.client.get(self.url("record:host")).query(&[
            ("name", fqdn),
            ("view", self.dns_view.as_str()),
            ("_return_fields", RETURN_FIELDS),
            ("_max_results", "1"),
        ]);
        let body = self.send(request).await?;

        let records: Vec<HostRecordWire> = serde_json::from_value(body).map_err(|e| {
            Error::protocol(format!("{SERVICE} returned an unexpected host record list: {e}"))
        })?;

        match records.into_iter().next() {
            Some(wire) => {
                let record = decode_host_record(wire)?;
                tracing::debug!(fqdn, reference = %record.reference, "Found Infoblox host record");
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Create a host record carrying the full target state
    ///
    /// # API Call
    ///
    /// ```http
    /// POST /wapi/v2.12.3/record:host?_return_fields=name
    /// {"name": "...", "view": "...", "ipv4addrs": [{"ipv4addr": "..."}], "extattrs": {...}}
    /// ```
    async fn create_host_record(&self, target: &HostRecordTarget) -> Result<String> {
        let payload = HostRecordPayload::new(target, Some(self.dns_view.as_str()));
        let request = self
            .client
            .post(self.url("record:host"))
            .query(&[("_return_fields", "name")])
            .json(&payload);

        let reference = reference_from(self.send(request).await?)?;
        tracing::info!(fqdn = %target.fqdn, ipv4 = %target.ipv4, reference = %reference, "Created Infoblox host record");
        Ok(reference)
    }

    /// Replace the addresses and attributes of an existing host record
    ///
    /// # API Call
    ///
    /// ```http
    /// PUT /wapi/v2.12.3/record:host/ZG5z...:server1.example.com/default
    /// {"name": "...", "ipv4addrs": [{"ipv4addr": "..."}], "extattrs": {...}}
    /// ```
    async fn update_host_record(&self, reference: &str, desired: &HostRecordTarget) -> Result<String> {
        let payload = HostRecordPayload::new(desired, None);
        let request = self.client.put(self.url(reference)).json(&payload);

        let reference = reference_from(self.send(request).await?)?;
        tracing::info!(fqdn = %desired.fqdn, ipv4 = %desired.ipv4, reference = %reference, "Updated Infoblox host record");
        Ok(reference)
    }

    fn sink_name(&self) -> &'static str {
        "infoblox"
    }
}

/// Classify a reqwest failure that produced no HTTP response
fn transport_error(e: reqwest::Error) -> Error {
    if e.is_decode() {
        Error::protocol(format!("{SERVICE} response could not be decoded: {e}"))
    } else {
        Error::transient(format!("{SERVICE} request failed: {e}"))
    }
}

/// Map an unsuccessful WAPI response to an error
fn classify_failure(status: u16, body: &str) -> Error {
    let wapi: WapiError = serde_json::from_str(body).unwrap_or_default();
    let detail = wapi
        .text
        .as_deref()
        .or(wapi.error.as_deref())
        .unwrap_or(body)
        .trim()
        .to_string();

    match status {
        400 if is_conflict(&wapi) => Error::conflict(format!("{SERVICE}: {detail}")),
        404 => Error::protocol(format!("{SERVICE} object not found (HTTP 404): {detail}")),
        _ => Error::from_status(SERVICE, status, &detail),
    }
}

fn is_conflict(wapi: &WapiError) -> bool {
    if wapi
        .code
        .as_deref()
        .is_some_and(|code| code.contains("Data.Conflict"))
    {
        return true;
    }

    [wapi.text.as_deref(), wapi.error.as_deref()]
        .into_iter()
        .flatten()
        .map(str::to_ascii_lowercase)
        .any(|msg| msg.contains("already exists") || msg.contains("already used"))
}

/// Read the object reference from a create/update response
///
/// WAPI returns a bare JSON string unless `_return_fields` was given, in which
/// case it returns an object with `_ref`.
fn reference_from(body: Value) -> Result<String> {
    let reference = match body {
        Value::String(reference) => Some(reference),
        Value::Object(mut fields) => match fields.remove("_ref") {
            Some(Value::String(reference)) => Some(reference),
            _ => None,
        },
        _ => None,
    };

    reference
        .filter(|r| !r.is_empty())
        .ok_or_else(|| Error::protocol(format!("{SERVICE} write response carried no object reference")))
}

fn decode_host_record(wire: HostRecordWire) -> Result<ExistingHostRecord> {
    let mut ipv4_addrs = Vec::with_capacity(wire.ipv4addrs.len());
    for addr in &wire.ipv4addrs {
        let ip: Ipv4Addr = addr.ipv4addr.parse().map_err(|_| {
            Error::protocol(format!(
                "{SERVICE} host record {} has invalid ipv4addr '{}'",
                wire.name, addr.ipv4addr
            ))
        })?;
        ipv4_addrs.push(ip);
    }

    let mac = wire
        .ipv4addrs
        .first()
        .and_then(|addr| addr.mac.as_deref())
        .and_then(normalize_mac)
        .filter(|mac| mac != NULL_MAC);

    Ok(ExistingHostRecord {
        reference: wire.reference,
        fqdn: wire.name,
        ipv4_addrs,
        mac,
        extattrs: decode_extattrs(&wire.extattrs),
    })
}

/// Encode attributes into the WAPI `{"name": {"value": v}}` form
pub fn encode_extattrs(extattrs: &ExtAttrs) -> Value {
    let encoded: Map<String, Value> = extattrs
        .iter()
        .map(|(name, value)| (name.clone(), json!({ "value": value })))
        .collect();
    Value::Object(encoded)
}

/// Decode attributes from the WAPI `{"name": {"value": v}}` form
///
/// Values of any shape are kept so a full-object update writes them back
/// unchanged. Entries without a `value` carry nothing to write and are ignored.
pub fn decode_extattrs(raw: &Map<String, Value>) -> ExtAttrs {
    raw.iter()
        .filter_map(|(name, entry)| {
            let Some(value) = entry.get("value") else {
                tracing::debug!(attribute = %name, "Ignoring extensible attribute without a value");
                return None;
            };
            let value = serde_json::from_value::<ExtAttrValue>(value.clone())
                .unwrap_or_else(|_| ExtAttrValue::Other(value.clone()));
            Some((name.clone(), value))
        })
        .collect()
}

/// Factory for creating Infoblox IPAM sinks
pub struct InfobloxFactory;

impl IpamSinkFactory for InfobloxFactory {
    fn create(&self, config: &IpamConfig) -> Result<Box<dyn IpamSink>> {
        Ok(Box::new(InfobloxClient::from_config(config)?))
    }
}

/// Register the Infoblox sink with a registry
pub fn register(registry: &ConnectorRegistry) {
    registry.register_ipam_sink("infoblox", Box::new(InfobloxFactory));
}
