//! HTTP device transport.
//!
//! Every call is a JSON POST to a single API endpoint, authenticated with a
//! bearer access token:
//!
//! ```json
//! {
//!   "method": "THSensor.getState",
//!   "targetDevice": "d88b4c010000abcd",
//!   "token": "<device token>",
//!   "params": {}
//! }
//! ```
//!
//! The API answers with an envelope `{"code": "000000", "desc": "Success",
//! "data": {...}}`. HTTP 401/403 and any code listed in
//! `auth_error_codes` are credential failures; other non-success codes are
//! client errors.

use std::time::Duration;

use async_trait::async_trait;
use hubsync_core::{DeviceEntry, HubConfig};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::transport::{ClientRequest, DeviceResponse, DeviceTransport, TransportError};

/// Envelope code for a successful call.
pub const SUCCESS_CODE: &str = "000000";

/// HTTP transport configuration for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpDeviceConfig {
    /// API endpoint URL
    pub endpoint: String,
    /// Bearer token for the API
    pub access_token: Option<String>,
    pub device_id: String,
    /// Device type, prefixed to every method name
    pub device_type: String,
    /// Per-device token sent in the request body
    pub device_token: Option<String>,
    /// Envelope codes treated as credential failures
    #[serde(default)]
    pub auth_error_codes: Vec<String>,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_timeout() -> u64 {
    10
}

impl HttpDeviceConfig {
    pub fn new(
        endpoint: impl Into<String>,
        device_id: impl Into<String>,
        device_type: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_token: None,
            device_id: device_id.into(),
            device_type: device_type.into(),
            device_token: None,
            auth_error_codes: Vec::new(),
            timeout: default_timeout(),
        }
    }

    /// Build the config for `device` from a hub config.
    pub fn from_hub(hub: &HubConfig, device: &DeviceEntry) -> Self {
        Self {
            endpoint: hub.endpoint.clone(),
            access_token: hub.access_token(),
            device_id: device.id.clone(),
            device_type: device.device_type.clone(),
            device_token: device.token.clone(),
            auth_error_codes: hub.auth_error_codes.clone(),
            timeout: hub.coordinator.refresh_timeout_secs,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn with_device_token(mut self, token: impl Into<String>) -> Self {
        self.device_token = Some(token.into());
        self
    }

    pub fn with_auth_error_code(mut self, code: impl Into<String>) -> Self {
        self.auth_error_codes.push(code.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: String,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

/// Decode an API reply into a response or a classified error.
pub fn decode_response(
    status: StatusCode,
    body: &str,
    auth_error_codes: &[String],
) -> Result<DeviceResponse, TransportError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(TransportError::auth(format!("HTTP {}", status)));
    }
    if !status.is_success() {
        return Err(TransportError::client(format!("HTTP {}", status)));
    }

    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| TransportError::client(format!("Invalid response body: {}", e)))?;

    if envelope.code != SUCCESS_CODE {
        let desc = envelope.desc.unwrap_or_else(|| "unknown error".to_string());
        if auth_error_codes.iter().any(|c| c == &envelope.code) {
            return Err(TransportError::auth(format!("{} ({})", desc, envelope.code)));
        }
        return Err(TransportError::with_code(envelope.code, desc));
    }

    match envelope.data {
        None | Some(Value::Null) => Ok(DeviceResponse::default()),
        Some(Value::Object(data)) => Ok(DeviceResponse::new(data)),
        Some(other) => Err(TransportError::client(format!(
            "Unexpected response data: {}",
            other
        ))),
    }
}

/// Device transport over the JSON HTTP API.
pub struct HttpDeviceTransport {
    config: HttpDeviceConfig,
    client: Client,
}

impl HttpDeviceTransport {
    pub fn new(config: HttpDeviceConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .map_err(|e| TransportError::client(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &HttpDeviceConfig {
        &self.config
    }

    /// Request body for `method` on this device.
    pub fn request_body(&self, method: &str, params: &Map<String, Value>) -> Value {
        let mut body = json!({
            "method": format!("{}.{}", self.config.device_type, method),
            "targetDevice": self.config.device_id,
            "time": chrono::Utc::now().timestamp_millis(),
        });
        if let Some(token) = &self.config.device_token {
            body["token"] = Value::String(token.clone());
        }
        if !params.is_empty() {
            body["params"] = Value::Object(params.clone());
        }
        body
    }

    async fn send(&self, method: &str, params: &Map<String, Value>) -> Result<DeviceResponse, TransportError> {
        let body = self.request_body(method, params);
        debug!(device_id = %self.config.device_id, method, "Calling device API");

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::client(format!("Request failed: {}", e)))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::client(format!("Failed to read response: {}", e)))?;

        decode_response(status, &text, &self.config.auth_error_codes)
    }
}

#[async_trait]
impl DeviceTransport for HttpDeviceTransport {
    fn device_id(&self) -> &str {
        &self.config.device_id
    }

    async fn fetch_state(&self) -> Result<DeviceResponse, TransportError> {
        self.send("getState", &Map::new()).await
    }

    async fn call_device(&self, request: ClientRequest) -> Result<DeviceResponse, TransportError> {
        self.send(&request.method, &request.params).await
    }
}
