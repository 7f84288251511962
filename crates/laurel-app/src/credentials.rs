//! # Secure Credential Store
//!
//! The only reader and writer of durable session credentials. The bundle is
//! five string slots in the platform's secure storage and is either fully
//! present or fully absent on read.
//!
//! The token slot is the commit marker: `store` removes it first, writes the
//! four other slots, and writes the token last; `clear` removes it first. A
//! process killed part-way through either operation therefore leaves no
//! token, and `load` reads the bundle back as absent.
//!
//! Bundle operations run one at a time per store (clones included), so an
//! expiry clear and a fresh sign-in never interleave slot by slot. Every
//! `store` and `clear` bumps a revision; [`SecureCredentialStore::clear_revision`]
//! only clears the bundle it was asked about and leaves a newer one alone.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use laurel_core::effects::SecureStorageEffects;
use laurel_core::LaurelError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

/// Slot holding the bearer token. Written last, deleted first.
pub const TOKEN_KEY: &str = "laurel.auth.token";
pub const TOKEN_TYPE_KEY: &str = "laurel.auth.token_type";
pub const USER_KEY_KEY: &str = "laurel.auth.user_key";
pub const USERNAME_KEY: &str = "laurel.auth.username";
pub const EMAIL_KEY: &str = "laurel.auth.email";

/// Every slot, token first.
pub const ALL_KEYS: [&str; 5] = [TOKEN_KEY, TOKEN_TYPE_KEY, USER_KEY_KEY, USERNAME_KEY, EMAIL_KEY];

/// The persisted credential bundle.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredAuthData {
    pub token: String,
    pub token_type: String,
    pub user_key: String,
    pub username: String,
    pub email: String,
}

impl StoredAuthData {
    /// `"<token_type> <token>"`, ready for an `Authorization` header.
    #[must_use]
    pub fn authorization_header_value(&self) -> String {
        format!("{} {}", self.token_type, self.token)
    }

    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            user_key: self.user_key.clone(),
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }

    fn slots(&self) -> [(&'static str, &str); 5] {
        [
            (TOKEN_KEY, &self.token),
            (TOKEN_TYPE_KEY, &self.token_type),
            (USER_KEY_KEY, &self.user_key),
            (USERNAME_KEY, &self.username),
            (EMAIL_KEY, &self.email),
        ]
    }
}

impl fmt::Debug for StoredAuthData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredAuthData")
            .field("token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("user_key", &self.user_key)
            .field("username", &self.username)
            .field("email", &self.email)
            .finish()
    }
}

/// Non-secret identity fields of the stored bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub user_key: String,
    pub username: String,
    pub email: String,
}

/// Credential persistence over a secure storage primitive.
///
/// Clones share the same storage, operation lock and revision.
#[derive(Clone)]
pub struct SecureCredentialStore {
    storage: Arc<dyn SecureStorageEffects>,
    /// Held for the whole of every bundle operation. Never held by callers.
    op_lock: Arc<AsyncMutex<()>>,
    revision: Arc<AtomicU64>,
}

impl fmt::Debug for SecureCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureCredentialStore")
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}

impl SecureCredentialStore {
    pub fn new(storage: Arc<dyn SecureStorageEffects>) -> Self {
        Self {
            storage,
            op_lock: Arc::new(AsyncMutex::new(())),
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Revision of the stored bundle. Bumped when a `store` or `clear`
    /// finishes, whatever its outcome.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// Persist the whole bundle, replacing any previous one.
    ///
    /// Empty fields are rejected since they would read back as absent.
    /// Write failures propagate; the token slot is only written once every
    /// other slot succeeded.
    pub async fn store(&self, data: &StoredAuthData) -> Result<(), LaurelError> {
        if let Some((key, _)) = data.slots().iter().find(|(_, value)| value.is_empty()) {
            return Err(LaurelError::invalid(format!(
                "Credential field {key} must not be empty"
            )));
        }

        let _op = self.op_lock.lock().await;
        let result = self.write_bundle(data).await;
        self.revision.fetch_add(1, Ordering::SeqCst);
        result?;

        tracing::debug!(user_key = %data.user_key, "Stored credentials");
        Ok(())
    }

    async fn write_bundle(&self, data: &StoredAuthData) -> Result<(), LaurelError> {
        self.storage.delete(TOKEN_KEY).await?;
        for (key, value) in data.slots().iter().skip(1) {
            self.storage.set(key, value).await?;
        }
        self.storage.set(TOKEN_KEY, &data.token).await?;
        Ok(())
    }

    /// Read the bundle back.
    ///
    /// Returns `None` when any slot is missing or empty, and when storage
    /// cannot be read at all (logged, fail-closed).
    pub async fn load(&self) -> Option<StoredAuthData> {
        let _op = self.op_lock.lock().await;
        let mut values = Vec::with_capacity(ALL_KEYS.len());
        for key in ALL_KEYS {
            match self.storage.get(key).await {
                Ok(Some(value)) if !value.is_empty() => values.push(value),
                Ok(_) => {
                    if key != TOKEN_KEY {
                        tracing::debug!(slot = key, "Credential bundle incomplete");
                    }
                    return None;
                }
                Err(err) => {
                    tracing::warn!(slot = key, error = %err, "Failed to read credentials");
                    return None;
                }
            }
        }

        let mut values = values.into_iter();
        Some(StoredAuthData {
            token: values.next()?,
            token_type: values.next()?,
            user_key: values.next()?,
            username: values.next()?,
            email: values.next()?,
        })
    }

    pub async fn authorization_header_value(&self) -> Option<String> {
        self.load()
            .await
            .map(|data| data.authorization_header_value())
    }

    pub async fn current_user_summary(&self) -> Option<UserSummary> {
        self.load().await.map(|data| data.summary())
    }

    /// Delete every slot. Safe to call when nothing is stored.
    ///
    /// Every slot is attempted even if one delete fails; the first failure
    /// is returned.
    pub async fn clear(&self) -> Result<(), LaurelError> {
        let _op = self.op_lock.lock().await;
        self.delete_bundle().await
    }

    /// Clear the bundle only if it is still at `revision`.
    ///
    /// Returns `Ok(false)` without touching storage when a `store` or
    /// `clear` finished after `revision` was read, including one that was
    /// already running at that point.
    pub async fn clear_revision(&self, revision: u64) -> Result<bool, LaurelError> {
        let _op = self.op_lock.lock().await;
        if self.revision() != revision {
            tracing::debug!(
                revision,
                current = self.revision(),
                "Credentials replaced; skipping clear"
            );
            return Ok(false);
        }
        self.delete_bundle().await.map(|()| true)
    }

    async fn delete_bundle(&self) -> Result<(), LaurelError> {
        let mut first_error = None;
        for key in ALL_KEYS {
            if let Err(err) = self.storage.delete(key).await {
                tracing::warn!(slot = key, error = %err, "Failed to delete credential slot");
                first_error.get_or_insert(err);
            }
        }
        self.revision.fetch_add(1, Ordering::SeqCst);
        match first_error {
            Some(err) => Err(err.into()),
            None => {
                tracing::debug!("Cleared stored credentials");
                Ok(())
            }
        }
    }
}
