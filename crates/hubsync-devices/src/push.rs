//! Live event messages delivered out of band (e.g. over MQTT).
//!
//! ```json
//! {
//!   "event": "WaterMeterController.Report",
//!   "time": 1714550400123,
//!   "msgid": "1714550400123",
//!   "deviceId": "d88b4c010000abcd",
//!   "data": { "state": { "valve": "open", "flowRate": 0 }, "battery": 4 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::DeviceState;

/// A decoded live event message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMessage {
    /// `<DeviceType>.<Kind>`, e.g. `THSensor.Report`
    pub event: String,
    /// Send time in unix milliseconds
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub msgid: Option<String>,
    pub device_id: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl PushMessage {
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Device type part of `event`.
    pub fn device_type(&self) -> &str {
        self.event
            .split_once('.')
            .map_or(self.event.as_str(), |(ty, _)| ty)
    }

    /// Kind part of `event` (`Report`, `Alert`, `StatusChange`, ...).
    pub fn kind(&self) -> &str {
        self.event.split_once('.').map_or("", |(_, kind)| kind)
    }

    /// The carried state; absent or non-object data yields `None`.
    pub fn state(&self) -> Option<DeviceState> {
        match &self.data {
            Some(Value::Object(state)) => Some(state.clone()),
            _ => None,
        }
    }
}
