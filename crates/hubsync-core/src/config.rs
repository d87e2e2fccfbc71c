//! Hub configuration: defaults, environment overrides and the TOML file format.
//!
//! Every coordinator timing value has a compile-time default in [`defaults`]
//! which can be overridden per process through the variables in [`env_vars`],
//! and per file through the `[coordinator]` table of a [`HubConfig`].
//!
//! ```toml
//! endpoint = "https://api.yosmart.com/open/yolink/v2/api"
//! access_token = "..."
//! auth_error_codes = ["010104"]
//!
//! [coordinator]
//! refresh_interval_secs = 1800
//! refresh_timeout_secs = 10
//! offline_threshold_secs = 32400
//!
//! [[devices]]
//! id = "d88b4c010000abcd"
//! device_type = "WaterMeterController"
//! token = "..."
//! paired_device = "d88b4c010000ef01"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default values for coordinator timing.
pub mod defaults {
    /// Scheduled refresh cadence, matching the device heartbeat interval
    pub const REFRESH_INTERVAL_SECS: u64 = 30 * 60;
    /// Upper bound for one refresh, paired fetch included
    pub const REFRESH_TIMEOUT_SECS: u64 = 10;
    /// Silence longer than this marks a device offline (9 hours)
    pub const OFFLINE_THRESHOLD_SECS: u64 = 32_400;
    pub const ENDPOINT: &str = "https://api.yosmart.com/open/yolink/v2/api";
}

/// Environment variable names.
pub mod env_vars {
    use super::defaults;

    pub const REFRESH_INTERVAL_SECS: &str = "HUBSYNC_REFRESH_INTERVAL_SECS";
    pub const REFRESH_TIMEOUT_SECS: &str = "HUBSYNC_REFRESH_TIMEOUT_SECS";
    pub const OFFLINE_THRESHOLD_SECS: &str = "HUBSYNC_OFFLINE_THRESHOLD_SECS";
    pub const ACCESS_TOKEN: &str = "HUBSYNC_ACCESS_TOKEN";
    pub const LOG_JSON: &str = "HUBSYNC_LOG_JSON";

    fn read_u64(name: &str, default: u64) -> u64 {
        std::env::var(name)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Refresh interval in seconds from the environment, or the default.
    pub fn refresh_interval_secs() -> u64 {
        read_u64(REFRESH_INTERVAL_SECS, defaults::REFRESH_INTERVAL_SECS)
    }

    /// Refresh timeout in seconds from the environment, or the default.
    pub fn refresh_timeout_secs() -> u64 {
        read_u64(REFRESH_TIMEOUT_SECS, defaults::REFRESH_TIMEOUT_SECS)
    }

    /// Offline threshold in seconds from the environment, or the default.
    pub fn offline_threshold_secs() -> u64 {
        read_u64(OFFLINE_THRESHOLD_SECS, defaults::OFFLINE_THRESHOLD_SECS)
    }

    /// Access token from the environment, if set and non-empty.
    pub fn access_token() -> Option<String> {
        std::env::var(ACCESS_TOKEN).ok().filter(|s| !s.is_empty())
    }

    /// Whether JSON log output was requested.
    pub fn log_json() -> bool {
        std::env::var(LOG_JSON)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(false)
    }
}

/// Timing configuration for one device state coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Scheduled refresh cadence in seconds
    #[serde(default = "env_vars::refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Timeout for one refresh in seconds
    #[serde(default = "env_vars::refresh_timeout_secs")]
    pub refresh_timeout_secs: u64,
    /// Offline threshold in seconds
    #[serde(default = "env_vars::offline_threshold_secs")]
    pub offline_threshold_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: defaults::REFRESH_INTERVAL_SECS,
            refresh_timeout_secs: defaults::REFRESH_TIMEOUT_SECS,
            offline_threshold_secs: defaults::OFFLINE_THRESHOLD_SECS,
        }
    }
}

impl CoordinatorConfig {
    /// Defaults with any environment overrides applied.
    pub fn from_env() -> Self {
        Self {
            refresh_interval_secs: env_vars::refresh_interval_secs(),
            refresh_timeout_secs: env_vars::refresh_timeout_secs(),
            offline_threshold_secs: env_vars::offline_threshold_secs(),
        }
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval_secs = interval.as_secs();
        self
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_offline_threshold(mut self, threshold: Duration) -> Self {
        self.offline_threshold_secs = threshold.as_secs();
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    pub fn offline_threshold(&self) -> Duration {
        Duration::from_secs(self.offline_threshold_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            return Err(Error::validation("refresh_interval_secs must be greater than 0"));
        }
        if self.refresh_timeout_secs == 0 {
            return Err(Error::validation("refresh_timeout_secs must be greater than 0"));
        }
        Ok(())
    }
}

/// One polled device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Remote device identifier
    pub id: String,
    /// Device type as named by the remote API (e.g. "THSensor")
    pub device_type: String,
    /// Per-device token required by the remote API
    #[serde(default)]
    pub token: Option<String>,
    /// Id of a paired device whose nested state overrides this one's
    #[serde(default)]
    pub paired_device: Option<String>,
}

/// Top-level hub configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubConfig {
    /// Device API endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Bearer token for the device API
    #[serde(default)]
    pub access_token: Option<String>,
    /// Response codes meaning the access token was rejected
    #[serde(default)]
    pub auth_error_codes: Vec<String>,
    #[serde(default = "CoordinatorConfig::from_env")]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

fn default_endpoint() -> String {
    defaults::ENDPOINT.to_string()
}

impl HubConfig {
    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: HubConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), devices = config.devices.len(), "Loaded hub config");
        Ok(config)
    }

    /// Access token from the file, falling back to the environment.
    pub fn access_token(&self) -> Option<String> {
        self.access_token.clone().or_else(env_vars::access_token)
    }

    pub fn device(&self, id: &str) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(Error::validation("endpoint must not be empty"));
        }
        self.coordinator.validate()?;

        for device in &self.devices {
            if device.id.trim().is_empty() {
                return Err(Error::validation("device id must not be empty"));
            }
            if device.device_type.trim().is_empty() {
                return Err(Error::validation(format!(
                    "device {} has an empty device_type",
                    device.id
                )));
            }
            if device.paired_device.as_deref() == Some(device.id.as_str()) {
                return Err(Error::validation(format!(
                    "device {} cannot be paired with itself",
                    device.id
                )));
            }
        }
        Ok(())
    }
}
