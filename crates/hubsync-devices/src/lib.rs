//! Device state reconciliation for hubsync.
//!
//! ## Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `http` | ✅ | Reference HTTP transport for the device API |
//!
//! ## Architecture
//!
//! - **DeviceTransport**: the device API seam (fetch state, call device)
//! - **DeviceStateCoordinator**: merges scheduled pulls and push updates into
//!   one normalized [`StateSnapshot`] and fans it out to listeners
//! - **Poller**: drives `refresh()` on the configured cadence
//! - **PushMessage**: decoder for live report messages

pub mod coordinator;
pub mod error;
pub mod poller;
pub mod push;
pub mod state;
pub mod status;
pub mod transport;

// Device transports implementing the transport interface
pub mod adapters;

pub use coordinator::{DeviceStateCoordinator, ListenerId, StateListener};
pub use error::{CoordinatorError, FailureCause};
pub use poller::{PollerExit, run_refresh_loop, spawn_refresh_loop};
pub use push::PushMessage;
pub use state::{DeviceState, StateSnapshot, normalize_state};
pub use status::{DeviceStatus, ReportTimeError, parse_report_time};
pub use transport::{
    ClientRequest, DeviceResponse, DeviceTransport, LoggingReauthHandler, ReauthHandler,
    TransportError,
};

#[cfg(feature = "http")]
pub use adapters::http::{HttpDeviceConfig, HttpDeviceTransport};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
