//! Events published by device coordinators.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which path produced a state snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateSource {
    /// Empty snapshot created with the coordinator
    Initial,
    /// Scheduled pull from the device API
    Refresh,
    /// Out-of-band push delivery
    Push,
}

impl std::fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Refresh => write!(f, "refresh"),
            Self::Push => write!(f, "push"),
        }
    }
}

/// Hub event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HubEvent {
    /// A new snapshot replaced the previous one
    StateUpdated {
        device_id: String,
        version: u64,
        source: UpdateSource,
        timestamp: i64,
    },
    /// The derived online flag or network type changed
    StatusChanged {
        device_id: String,
        online: bool,
        net_type: Option<String>,
        timestamp: i64,
    },
    /// The device API rejected the credentials
    ReauthRequired { device_id: String, timestamp: i64 },
    /// A scheduled refresh failed and will be retried next tick
    UpdateFailed {
        device_id: String,
        error: String,
        timestamp: i64,
    },
}

impl HubEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::StateUpdated { .. } => "StateUpdated",
            Self::StatusChanged { .. } => "StatusChanged",
            Self::ReauthRequired { .. } => "ReauthRequired",
            Self::UpdateFailed { .. } => "UpdateFailed",
        }
    }

    pub fn device_id(&self) -> &str {
        match self {
            Self::StateUpdated { device_id, .. }
            | Self::StatusChanged { device_id, .. }
            | Self::ReauthRequired { device_id, .. }
            | Self::UpdateFailed { device_id, .. } => device_id,
        }
    }

    /// Whether the event reports a failure.
    pub fn is_error_event(&self) -> bool {
        matches!(self, Self::ReauthRequired { .. } | Self::UpdateFailed { .. })
    }
}

/// Metadata attached to every published event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub event_id: Uuid,
    /// Component that published the event
    pub source: String,
    /// Publish time, unix milliseconds
    pub published_at: i64,
}

impl EventMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            source: source.into(),
            published_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}
