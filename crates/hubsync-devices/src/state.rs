//! Device state snapshots and their normalization.

use chrono::{DateTime, Utc};
use hubsync_core::UpdateSource;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::status::DeviceStatus;

/// Raw device state as returned by the device API.
pub type DeviceState = Map<String, Value>;

/// Nested device state, both in responses and inside the state itself
pub const ATTR_DEVICE_STATE: &str = "state";
pub const ATTR_LORA_INFO: &str = "loraInfo";
pub const ATTR_NET_TYPE: &str = "devNetType";
pub const ATTR_REPORT_AT: &str = "reportAt";

pub const ATTR_FLOW_RATE: &str = "flowRate";
pub const ATTR_RECENT_USAGE: &str = "recentUsage";
pub const ATTR_AMOUNT: &str = "amount";

/// Flattened copy of `state.flowRate`
pub const FLOW_RATE: &str = "flow_rate";
/// Flattened copy of `recentUsage.amount`
pub const RECENT_USAGE_AMOUNT: &str = "recent_usage_amount";

/// Normalize a raw device state.
///
/// Copies nested water meter fields to flat top-level keys so consumers can
/// read them without walking the structure. The copies are additive: the
/// nested originals and every other field are left untouched and in order.
/// Absent input yields an empty state. Applying it twice is the same as
/// applying it once.
pub fn normalize_state(state: Option<DeviceState>) -> DeviceState {
    let mut state = state.unwrap_or_default();
    normalize_in_place(&mut state);
    state
}

/// In-place variant of [`normalize_state`].
pub fn normalize_in_place(state: &mut DeviceState) {
    let flow_rate = nested_field(state, ATTR_DEVICE_STATE, ATTR_FLOW_RATE);
    if let Some(flow_rate) = flow_rate {
        state.insert(FLOW_RATE.to_string(), flow_rate);
    }

    let amount = nested_field(state, ATTR_RECENT_USAGE, ATTR_AMOUNT);
    if let Some(amount) = amount {
        state.insert(RECENT_USAGE_AMOUNT.to_string(), amount);
    }
}

// JSON null counts as absent.
fn nested_field(state: &DeviceState, outer: &str, inner: &str) -> Option<Value> {
    state
        .get(outer)?
        .as_object()?
        .get(inner)
        .filter(|v| !v.is_null())
        .cloned()
}

/// Immutable, published device state.
///
/// Each write to a coordinator produces a new snapshot with a higher
/// `version`; listeners can compare versions to detect staleness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    pub version: u64,
    pub source: UpdateSource,
    pub state: DeviceState,
    pub status: DeviceStatus,
    pub updated_at: DateTime<Utc>,
}

impl StateSnapshot {
    /// Empty snapshot held by a freshly built coordinator.
    pub fn initial() -> Self {
        Self {
            version: 0,
            source: UpdateSource::Initial,
            state: DeviceState::new(),
            status: DeviceStatus::default(),
            updated_at: Utc::now(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.state.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    pub fn online(&self) -> bool {
        self.status.online
    }

    pub fn flow_rate(&self) -> Option<&Value> {
        self.state.get(FLOW_RATE)
    }

    pub fn recent_usage_amount(&self) -> Option<&Value> {
        self.state.get(RECENT_USAGE_AMOUNT)
    }
}
