//! Mock secure storage effect handler for testing

use async_trait::async_trait;
use laurel_core::effects::{SecureStorageEffects, SecureStorageError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory secure storage with failure injection.
///
/// Clones share the same slots, so a test can keep a handle for inspection
/// after handing one to the code under test.
#[derive(Debug, Clone, Default)]
pub struct MockSecureStorage {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    slots: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_deletes: AtomicBool,
    /// Number of further writes allowed before every write fails.
    writes_remaining: Mutex<Option<usize>>,
    latency: Mutex<Option<Duration>>,
    set_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MockSecureStorage {
    /// Empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with `entries`.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let storage = Self::new();
        {
            let mut slots = storage.inner.slots.lock();
            for (key, value) in entries {
                slots.insert(key.to_string(), value.to_string());
            }
        }
        storage
    }

    /// Make every `get` fail.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every `delete` fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.inner.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Allow `n` more successful writes, then fail every write.
    ///
    /// Simulates the process dying part-way through a multi-slot write.
    pub fn fail_writes_after(&self, n: usize) {
        *self.inner.writes_remaining.lock() = Some(n);
    }

    /// Remove any write failure injection.
    pub fn allow_writes(&self) {
        *self.inner.writes_remaining.lock() = None;
    }

    /// Delay every `set` and `delete` by `latency` (tokio clock), after the
    /// call is counted.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = Some(latency);
    }

    async fn delay(&self) {
        let latency = *self.inner.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    /// Directly read a slot, bypassing failure injection.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.slots.lock().get(key).cloned()
    }

    /// Directly remove a slot, bypassing failure injection.
    pub fn remove_raw(&self, key: &str) {
        self.inner.slots.lock().remove(key);
    }

    /// Number of populated slots.
    pub fn len(&self) -> usize {
        self.inner.slots.lock().len()
    }

    /// Whether no slot is populated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total `set` calls, successful or not.
    pub fn set_calls(&self) -> usize {
        self.inner.set_calls.load(Ordering::SeqCst)
    }

    /// Total `delete` calls, successful or not.
    pub fn delete_calls(&self) -> usize {
        self.inner.delete_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecureStorageEffects for MockSecureStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, SecureStorageError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(SecureStorageError::read(key, "injected read failure"));
        }
        Ok(self.inner.slots.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SecureStorageError> {
        self.inner.set_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        {
            let mut remaining = self.inner.writes_remaining.lock();
            match remaining.as_mut() {
                Some(0) => return Err(SecureStorageError::write(key, "injected write failure")),
                Some(n) => *n -= 1,
                None => {}
            }
        }
        self.inner
            .slots
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SecureStorageError> {
        self.inner.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if self.inner.fail_deletes.load(Ordering::SeqCst) {
            return Err(SecureStorageError::delete(key, "injected delete failure"));
        }
        self.inner.slots.lock().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_budget_then_failure() {
        let storage = MockSecureStorage::new();
        storage.fail_writes_after(1);
        assert!(storage.set("a", "1").await.is_ok());
        assert!(storage.set("b", "2").await.is_err());
        assert_eq!(storage.peek("a").as_deref(), Some("1"));
        assert_eq!(storage.peek("b"), None);
        assert_eq!(storage.set_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_delays_writes() {
        let storage = MockSecureStorage::new();
        storage.set_latency(Duration::from_millis(50));
        let start = tokio::time::Instant::now();
        storage.set("a", "1").await.unwrap();
        storage.delete("a").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_clones_share_slots() {
        let storage = MockSecureStorage::with_entries([("k", "v")]);
        let handle = storage.clone();
        handle.delete("k").await.unwrap();
        assert!(storage.is_empty());
        assert_eq!(storage.delete_calls(), 1);
    }
}
