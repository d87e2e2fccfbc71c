//! Device transports.
//!
//! | Transport | Feature | Description |
//! |-----------|---------|-------------|
//! | [`http::HttpDeviceTransport`] | `http` | JSON-over-HTTP device API |

#[cfg(feature = "http")]
pub mod http;
