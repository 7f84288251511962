//! Client configuration
//!
//! Configuration is layered: defaults, then an optional TOML file, then
//! `LAUREL_*` environment variables, then validation.

mod client;

pub use client::{
    ApiConfig, CacheConfig, ClientConfig, EndpointPaths, SessionConfig, ENV_API_BASE_URL,
    ENV_CACHE_TTL_SECS, ENV_SESSION_TIMEOUT_SECS,
};

use crate::LaurelError;

/// Configuration loading and validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read config file {path}: {reason}")]
    Read {
        /// File that was requested
        path: String,
        /// I/O failure
        reason: String,
    },
    /// The file is not valid TOML for this schema
    #[error("failed to parse config: {0}")]
    Parse(String),
    /// An environment override could not be interpreted
    #[error("invalid value for {var}: {reason}")]
    Env {
        /// Environment variable name
        var: String,
        /// Why its value was rejected
        reason: String,
    },
    /// A field holds an unusable value
    #[error("invalid config field '{field}': {reason}")]
    Invalid {
        /// Dotted path of the field
        field: String,
        /// Why its value was rejected
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<ConfigError> for LaurelError {
    fn from(err: ConfigError) -> Self {
        LaurelError::config(err.to_string())
    }
}
