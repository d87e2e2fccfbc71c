//! Error type for configuration and I/O in hubsync-core.

use std::path::PathBuf;

/// Result alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading or validating hub configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Reading a config file failed
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`crate::HubConfig`]
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config parsed but violates a constraint
    #[error("Configuration error: {0}")]
    Validation(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
