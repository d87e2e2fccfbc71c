//! Coordinator outcomes other than a published snapshot.

use std::time::Duration;

use crate::transport::TransportError;

/// What went wrong below the coordinator.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FailureCause {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Coordinator error.
///
/// The host decides recovery from the variant: `ReauthRequired` means stop
/// polling until credentials are renewed, `UpdateFailed` means retry on the
/// next tick, `CallFailed` only fails the individual command.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoordinatorError {
    #[error("Re-authentication required for device {device_id}: {source}")]
    ReauthRequired {
        device_id: String,
        #[source]
        source: TransportError,
    },

    #[error("Failed to obtain device status, device: {device_id}, error: {cause}")]
    UpdateFailed {
        device_id: String,
        #[source]
        cause: FailureCause,
    },

    #[error("Device call failed, device: {device_id}, error: {cause}")]
    CallFailed {
        device_id: String,
        #[source]
        cause: FailureCause,
    },
}

impl CoordinatorError {
    pub fn device_id(&self) -> &str {
        match self {
            Self::ReauthRequired { device_id, .. }
            | Self::UpdateFailed { device_id, .. }
            | Self::CallFailed { device_id, .. } => device_id,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::ReauthRequired { .. })
    }

    /// Whether the scheduler should try again on its next tick.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpdateFailed { .. })
    }
}
