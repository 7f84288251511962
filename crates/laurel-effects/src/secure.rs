//! Layer 3: Encrypted file secure storage
//!
//! Implements `SecureStorageEffects` for hosts without a platform keychain
//! (desktop shells, integration environments). Each slot lives in its own
//! file sealed with ChaCha20-Poly1305; the slot name is bound as associated
//! data so a file copied onto another slot fails authentication.
//!
//! Blob format: version (1 byte) || nonce (12 bytes) || ciphertext
//!
//! Writes go to a temporary file that is renamed over the slot, so a crash
//! leaves either the old or the new value of that slot, never a torn one.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use laurel_core::effects::{SecureStorageEffects, SecureStorageError};
use rand::RngCore;
use zeroize::Zeroizing;

/// Nonce size for ChaCha20-Poly1305 (96 bits = 12 bytes)
const NONCE_SIZE: usize = 12;

/// Version byte for encrypted blob format
const BLOB_VERSION: u8 = 0x01;

const SLOT_EXTENSION: &str = "slot";

/// 256-bit storage key, zeroized on drop.
pub struct SecureStorageKey(Zeroizing<[u8; 32]>);

impl SecureStorageKey {
    /// Wrap existing key material (for example one released by the platform keystore).
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = Zeroizing::new([0u8; 32]);
        rand::rngs::OsRng.fill_bytes(&mut bytes[..]);
        Self(bytes)
    }
}

impl std::fmt::Debug for SecureStorageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecureStorageKey(<redacted>)")
    }
}

/// Directory of encrypted slot files.
pub struct EncryptedFileSecureStorage {
    root: PathBuf,
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for EncryptedFileSecureStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedFileSecureStorage")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl EncryptedFileSecureStorage {
    /// Create a handler rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>, key: &SecureStorageKey) -> Self {
        Self {
            root: root.into(),
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key.0[..])),
        }
    }

    /// Root directory of the slot files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn slot_path(&self, key: &str) -> Result<PathBuf, String> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid || key.starts_with('.') {
            return Err(format!("invalid slot name '{key}'"));
        }
        Ok(self.root.join(format!("{key}.{SLOT_EXTENSION}")))
    }

    fn seal(&self, key: &str, value: &str) -> Result<Vec<u8>, String> {
        let mut nonce = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: value.as_bytes(),
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| "encryption failed".to_string())?;

        let mut blob = Vec::with_capacity(1 + NONCE_SIZE + ciphertext.len());
        blob.push(BLOB_VERSION);
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn open(&self, key: &str, blob: &[u8]) -> Result<String, String> {
        if blob.len() < 1 + NONCE_SIZE {
            return Err("blob too short".to_string());
        }
        if blob[0] != BLOB_VERSION {
            return Err(format!("unsupported blob version {}", blob[0]));
        }
        let (nonce, ciphertext) = blob[1..].split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: key.as_bytes(),
                },
            )
            .map_err(|_| "integrity check failed".to_string())?;
        String::from_utf8(plaintext).map_err(|e| e.to_string())
    }
}

#[async_trait]
impl SecureStorageEffects for EncryptedFileSecureStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, SecureStorageError> {
        let path = self
            .slot_path(key)
            .map_err(|reason| SecureStorageError::read(key, reason))?;
        let blob = match tokio::fs::read(&path).await {
            Ok(blob) => blob,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SecureStorageError::read(key, e.to_string())),
        };
        self.open(key, &blob)
            .map(Some)
            .map_err(|reason| SecureStorageError::read(key, reason))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SecureStorageError> {
        let path = self
            .slot_path(key)
            .map_err(|reason| SecureStorageError::write(key, reason))?;
        let blob = self
            .seal(key, value)
            .map_err(|reason| SecureStorageError::write(key, reason))?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| SecureStorageError::write(key, e.to_string()))?;

        let tmp = path.with_extension(format!("{SLOT_EXTENSION}.tmp"));
        tokio::fs::write(&tmp, &blob)
            .await
            .map_err(|e| SecureStorageError::write(key, e.to_string()))?;
        restrict_permissions(&tmp)
            .await
            .map_err(|e| SecureStorageError::write(key, e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| SecureStorageError::write(key, e.to_string()))?;

        tracing::trace!(slot = key, "secure slot written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SecureStorageError> {
        let path = self
            .slot_path(key)
            .map_err(|reason| SecureStorageError::delete(key, reason))?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SecureStorageError::delete(key, e.to_string())),
        }
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
