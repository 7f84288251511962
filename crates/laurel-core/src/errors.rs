//! Local error type for Laurel core
//!
//! Request failures have their own normalized shape ([`crate::RequestError`])
//! because callers inspect their status code and body. Everything that fails
//! on the device itself (bad input, storage, configuration, decoding, client
//! setup) funnels through [`LaurelError`].

use serde::{Deserialize, Serialize};

use crate::effects::SecureStorageError;

/// Failure of a local operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum LaurelError {
    /// Caller-supplied data was rejected before any side effect
    #[error("Invalid: {message}")]
    Invalid {
        /// What was wrong with the input
        message: String,
    },

    /// A network client could not be set up
    #[error("Network error: {message}")]
    Network {
        /// Why the client could not be built
        message: String,
    },

    /// A value did not have the expected shape
    #[error("Serialization error: {message}")]
    Serialization {
        /// Decoder message
        message: String,
    },

    /// The secure storage primitive failed
    #[error("Storage error: {message}")]
    Storage {
        /// The underlying storage failure, rendered
        message: String,
    },

    /// Configuration could not be loaded or is inconsistent
    #[error("Config error: {message}")]
    Config {
        /// The underlying configuration failure, rendered
        message: String,
    },
}

impl LaurelError {
    /// Reject caller input
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Report a client setup failure
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Report a decode failure
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Report a storage failure
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Report a configuration failure
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result alias for local operations.
pub type Result<T> = std::result::Result<T, LaurelError>;

impl From<serde_json::Error> for LaurelError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<SecureStorageError> for LaurelError {
    fn from(err: SecureStorageError) -> Self {
        Self::storage(err.to_string())
    }
}
