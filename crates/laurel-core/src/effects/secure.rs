//! Secure storage effect trait.
//!
//! Models the platform secure-storage primitive (keychain, keystore) as a set
//! of independent string slots with async get/set/delete. The credential store
//! in `laurel-app` is the only caller.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Secure storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum SecureStorageError {
    /// Reading a slot failed (distinct from the slot being empty)
    #[error("failed to read secure slot '{key}': {reason}")]
    Read {
        /// Slot name
        key: String,
        /// Platform or I/O failure
        reason: String,
    },
    /// Writing a slot failed
    #[error("failed to write secure slot '{key}': {reason}")]
    Write {
        /// Slot name
        key: String,
        /// Platform or I/O failure
        reason: String,
    },
    /// Deleting a slot failed
    #[error("failed to delete secure slot '{key}': {reason}")]
    Delete {
        /// Slot name
        key: String,
        /// Platform or I/O failure
        reason: String,
    },
}

impl SecureStorageError {
    /// Create a read error
    pub fn read(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Read {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a write error
    pub fn write(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Write {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a delete error
    pub fn delete(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delete {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Async string-slot secure storage.
///
/// Contract:
/// - `get` returns `Ok(None)` for a slot that was never written or was deleted
/// - `delete` of an absent slot succeeds
#[async_trait]
pub trait SecureStorageEffects: Send + Sync {
    /// Read a slot.
    async fn get(&self, key: &str) -> Result<Option<String>, SecureStorageError>;

    /// Write a slot, replacing any previous value.
    async fn set(&self, key: &str, value: &str) -> Result<(), SecureStorageError>;

    /// Delete a slot.
    async fn delete(&self, key: &str) -> Result<(), SecureStorageError>;
}

/// Blanket implementation for Arc<T> where T: SecureStorageEffects
#[async_trait]
impl<T: SecureStorageEffects + ?Sized> SecureStorageEffects for std::sync::Arc<T> {
    async fn get(&self, key: &str) -> Result<Option<String>, SecureStorageError> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SecureStorageError> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> Result<(), SecureStorageError> {
        (**self).delete(key).await
    }
}
