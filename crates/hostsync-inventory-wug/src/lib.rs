// # WhatsUp Gold Inventory Source
//
// This crate provides the WhatsUp Gold REST implementation of
// `InventorySource`.
//
// ## Protocol
//
// 1. Authenticate: `POST {token_endpoint}` with a password grant, or HTTP
//    Basic on every request
// 2. List: `GET {devices_endpoint}?view=overview&limit={page_size}` (capped at
//    the devices still wanted), then
//    follow `paging.nextPageId` until it is empty or `limit` devices are
//    collected
//
// Every request runs under the engine's retry policy. A 401 on a listing
// request triggers exactly one token refresh per client lifetime.

use hostsync_core::config::{Credentials, InventoryAuthMode, InventoryConfig};
use hostsync_core::retry::RetryPolicy;
use hostsync_core::traits::{Device, DeviceStatus, InventorySource, InventorySourceFactory};
use hostsync_core::{ConnectorRegistry, Error, Result};

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const SERVICE: &str = "WhatsUp Gold";

/// Authorization applied to listing requests
enum Authorization {
    Bearer(String),
    Basic,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// WhatsUp Gold REST client
pub struct WugClient {
    /// Base URL without trailing slash
    base_url: String,

    credentials: Credentials,

    auth_mode: InventoryAuthMode,

    token_endpoint: String,

    devices_endpoint: String,

    /// Devices requested per page
    page_size: usize,

    /// Applied to every outbound request
    retry: RetryPolicy,

    /// Set once the single allowed token refresh has been spent
    token_refreshed: AtomicBool,

    /// HTTP client
    client: reqwest::Client,
}

impl WugClient {
    /// Create a client from a `whatsup_gold` inventory configuration
    pub fn from_config(config: &InventoryConfig, retry: RetryPolicy) -> Result<Self> {
        let InventoryConfig::WhatsUpGold {
            base_url,
            credentials,
            auth,
            token_endpoint,
            devices_endpoint,
            page_size,
            verify_tls,
            timeout_secs,
        } = config
        else {
            return Err(Error::config("Invalid config for WhatsUp Gold inventory source"));
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(*timeout_secs))
            .danger_accept_invalid_certs(!verify_tls)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials: credentials.clone(),
            auth_mode: *auth,
            token_endpoint: token_endpoint.clone(),
            devices_endpoint: devices_endpoint.clone(),
            page_size: (*page_size).max(1),
            retry,
            token_refreshed: AtomicBool::new(false),
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Obtain the authorization for one invocation
    async fn authorize(&self) -> Result<Authorization> {
        match self.auth_mode {
            InventoryAuthMode::Basic => Ok(Authorization::Basic),
            InventoryAuthMode::Token => {
                let token = self
                    .retry
                    .run("wug_token", || self.request_token())
                    .await?;
                Ok(Authorization::Bearer(token))
            }
        }
    }

    /// Exchange credentials for a bearer token (password grant)
    async fn request_token(&self) -> Result<String> {
        let url = self.url(&self.token_endpoint);
        debug!(url = %url, "Requesting WhatsUp Gold token");

        let response = self
            .client
            .post(&url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "password"),
                ("username", self.credentials.username.as_str()),
                ("password", self.credentials.password.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            // OAuth servers answer a bad password grant with 400 invalid_grant
            if status == 400 {
                return Err(Error::auth(format!(
                    "{SERVICE} rejected credentials (HTTP 400): {}",
                    body.trim()
                )));
            }
            return Err(Error::from_status(SERVICE, status, &body));
        }

        let token: TokenResponse = read_json(response).await?;
        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::protocol(format!("{SERVICE} token response has no access_token")))
    }

    /// Fetch one page of the device listing
    async fn list_page(
        &self,
        authorization: &Authorization,
        page_id: Option<&str>,
        page_limit: usize,
    ) -> Result<(Vec<Value>, Option<String>)> {
        let url = self.url(&self.devices_endpoint);
        let page_limit = page_limit.to_string();
        let mut query = vec![("view", "overview"), ("limit", page_limit.as_str())];
        if let Some(page_id) = page_id {
            query.push(("pageId", page_id));
        }

        debug!(url = %url, ?page_id, "Fetching WhatsUp Gold device page");

        let request = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(&query);
        let request = match authorization {
            Authorization::Bearer(token) => request.bearer_auth(token),
            Authorization::Basic => request.basic_auth(
                &self.credentials.username,
                Some(&self.credentials.password),
            ),
        };

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(SERVICE, status, &body));
        }

        let body: Value = read_json(response).await?;
        parse_page(body)
    }

    /// Spend the single token refresh, if it is still available
    fn try_refresh(&self) -> bool {
        self.auth_mode == InventoryAuthMode::Token && !self.token_refreshed.swap(true, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for WugClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WugClient")
            .field("base_url", &self.base_url)
            .field("credentials", &self.credentials)
            .field("auth_mode", &self.auth_mode)
            .field("page_size", &self.page_size)
            .finish()
    }
}

#[async_trait::async_trait]
impl InventorySource for WugClient {
    async fn fetch_devices(&self, limit: Option<usize>) -> Result<Vec<Device>> {
        let limit = limit.unwrap_or(usize::MAX);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut authorization = self.authorize().await?;
        let mut devices = Vec::new();
        let mut seen_ids = HashSet::new();
        let mut seen_cursors = HashSet::new();
        let mut page_id: Option<String> = None;

        loop {
            // Never ask for more than the caller still needs
            let page_limit = self.page_size.min(limit - devices.len());
            let listed = self
                .retry
                .run("wug_list_devices", || {
                    self.list_page(&authorization, page_id.as_deref(), page_limit)
                })
                .await;

            let (items, next_page_id) = match listed {
                Ok(page) => page,
                Err(Error::Auth(msg)) if self.try_refresh() => {
                    warn!(error = %msg, "WhatsUp Gold rejected token, refreshing once");
                    authorization = self.authorize().await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            for item in &items {
                let Some(device) = parse_device(item) else {
                    warn!(item = %item, "Dropping WhatsUp Gold device without an id");
                    continue;
                };
                if !seen_ids.insert(device.id.clone()) {
                    debug!(device_id = %device.id, "Dropping duplicate WhatsUp Gold device");
                    continue;
                }
                devices.push(device);
                if devices.len() >= limit {
                    info!(count = devices.len(), "Fetched WhatsUp Gold devices (limit reached)");
                    return Ok(devices);
                }
            }

            match next_page_id {
                Some(next) if seen_cursors.insert(next.clone()) => page_id = Some(next),
                Some(next) => {
                    warn!(page_id = %next, "WhatsUp Gold repeated a page cursor, stopping");
                    break;
                }
                None => break,
            }
        }

        info!(count = devices.len(), "Fetched WhatsUp Gold devices");
        Ok(devices)
    }

    fn source_name(&self) -> &'static str {
        "whatsup_gold"
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

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let body = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&body)
        .map_err(|e| Error::protocol(format!("{SERVICE} returned invalid JSON: {e}")))
}

/// Split a listing body into device items and the next page cursor
fn parse_page(mut body: Value) -> Result<(Vec<Value>, Option<String>)> {
    let items = match body.pointer_mut("/data/devices").map(Value::take) {
        Some(Value::Array(items)) => items,
        _ => {
            return Err(Error::protocol(format!(
                "{SERVICE} device listing has no data.devices array"
            )));
        }
    };

    let next_page_id = body
        .pointer("/paging/nextPageId")
        .and_then(scalar_to_string);

    Ok((items, next_page_id))
}

/// Normalize one listing item; `None` when it is not an object or has no id
fn parse_device(item: &Value) -> Option<Device> {
    let fields = item.as_object()?;
    let id = first_field(fields, &["id", "deviceId"])?;

    let name = first_field(fields, &["displayName", "hostName", "name"])
        .unwrap_or_else(|| format!("wug-{id}"));
    let address =
        first_field(fields, &["networkAddress", "ipAddress", "primaryAddress"]).unwrap_or_default();
    let status = first_field(fields, &["bestState", "state", "status"])
        .map(|raw| DeviceStatus::parse_lenient(&raw))
        .unwrap_or_default();

    let mut device = Device::new(id, name, address).with_status(status);
    if let Some(mac) = first_field(fields, &["macAddress"]) {
        device = device.with_mac(mac);
    }
    if let Some(group) = first_field(fields, &["groupName"]) {
        device = device.with_group(group);
    }
    Some(device)
}

fn first_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| fields.get(*key).and_then(scalar_to_string))
}

/// Non-empty string or number, as text
fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Factory for creating WhatsUp Gold inventory sources
pub struct WugFactory;

impl InventorySourceFactory for WugFactory {
    fn create(
        &self,
        config: &InventoryConfig,
        retry: &RetryPolicy,
    ) -> Result<Box<dyn InventorySource>> {
        Ok(Box::new(WugClient::from_config(config, *retry)?))
    }
}

/// Register the WhatsUp Gold inventory source with a registry
pub fn register(registry: &ConnectorRegistry) {
    registry.register_inventory_source("whatsup_gold", Box::new(WugFactory));
}
