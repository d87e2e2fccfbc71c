//! Device transport interface.
//!
//! A transport wraps one remote device: it fetches the device's current state
//! and forwards commands to it. Both calls return the `data` part of the API
//! response envelope.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Transport errors, split by whether credentials are at fault.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransportError {
    /// The API rejected the access credentials
    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    /// Any other request or API failure
    #[error("Client error: {message}")]
    Client {
        /// API result code, when the API returned one
        code: Option<String>,
        message: String,
    },
}

impl TransportError {
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::AuthFailure(msg.into())
    }

    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client {
            code: None,
            message: msg.into(),
        }
    }

    pub fn with_code(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Client {
            code: Some(code.into()),
            message: msg.into(),
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailure(_))
    }
}

/// The `data` part of a device API response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceResponse {
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl DeviceResponse {
    pub fn new(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// Build a response from a JSON value; non-objects yield empty data.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(data) => Self { data },
            _ => Self::default(),
        }
    }
}

/// A device command: a method name relative to the device type plus params.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRequest {
    pub method: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ClientRequest {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }
}

/// Remote device handle.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Remote identifier of the device.
    fn device_id(&self) -> &str;

    /// Fetch the device's current state.
    async fn fetch_state(&self) -> Result<DeviceResponse, TransportError>;

    /// Forward a command to the device.
    async fn call_device(&self, request: ClientRequest) -> Result<DeviceResponse, TransportError>;
}

/// Host hook that starts credential re-entry.
pub trait ReauthHandler: Send + Sync {
    fn start_reauth(&self, device_id: &str);
}

/// Re-authentication handler that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingReauthHandler;

impl ReauthHandler for LoggingReauthHandler {
    fn start_reauth(&self, device_id: &str) {
        tracing::warn!(device_id, "Credentials rejected, re-authentication required");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_display() {
        assert_eq!(
            TransportError::auth("token expired").to_string(),
            "Authentication failed: token expired"
        );
        assert_eq!(
            TransportError::with_code("020104", "device busy").to_string(),
            "Client error: device busy"
        );
        assert!(TransportError::auth("x").is_auth_failure());
        assert!(!TransportError::client("x").is_auth_failure());
    }

    #[test]
    fn test_response_from_non_object() {
        assert!(DeviceResponse::from_value(json!([1, 2])).data.is_empty());
        let resp = DeviceResponse::from_value(json!({"online": true}));
        assert_eq!(resp.data["online"], json!(true));
    }

    #[test]
    fn test_client_request_builder() {
        let request = ClientRequest::new("setState").with_param("state", "open");
        assert_eq!(request.method, "setState");
        assert_eq!(request.params["state"], json!("open"));
    }
}
