//! Core types shared across hubsync crates.
//!
//! This crate defines configuration loading, the error type used for it,
//! and the event bus that device coordinators publish to.

pub mod config;
pub mod error;
pub mod event;
pub mod eventbus;

pub use config::{CoordinatorConfig, DeviceEntry, HubConfig};
pub use error::{Error, Result};
pub use event::{EventMetadata, HubEvent, UpdateSource};
pub use eventbus::{EventBus, EventBusReceiver, FilteredReceiver};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{CoordinatorConfig, DeviceEntry, HubConfig, defaults, env_vars};
    pub use crate::error::{Error, Result};
    pub use crate::event::{EventMetadata, HubEvent, UpdateSource};
    pub use crate::eventbus::EventBus;
}
