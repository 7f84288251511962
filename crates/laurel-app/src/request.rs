//! # Request Coordinator
//!
//! Wraps one kind of remote operation with:
//!
//! - **De-duplication**: at most one execution is in flight per coordinator.
//!   A caller arriving while one is outstanding awaits the same shared
//!   future; the operation is not invoked again.
//! - **Time-boxed caching**: successes are stored under the caller's cache
//!   key with the clock's timestamp and reused while younger than the TTL.
//!   Stale entries are ignored, not evicted.
//! - **Normalized outcomes**: `execute` returns `Result<T, RequestError>`.
//!   The optional `on_success`/`on_error` callbacks fire at most once per
//!   execution that actually ran the operation. A panicking operation is
//!   reported as a `RequestError` and leaves the coordinator usable.
//!
//! `reset` detaches state from an outstanding execution without cancelling
//! it: the caller awaiting it still receives its result, but the result no
//! longer lands in the coordinator's data, error or cache and fires no
//! callbacks.
//!
//! Locks are never held across an `.await`.

use std::collections::HashMap;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use laurel_core::effects::PhysicalTimeEffects;
use laurel_core::{PhysicalTime, RequestError};
use parking_lot::Mutex;

/// Default lifetime of a cached result.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

type SharedOutcome<T> = Shared<BoxFuture<'static, Result<T, RequestError>>>;

/// Callback invoked with a completed execution's value or error.
pub type Callback<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// A cached success and when it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedResult<T> {
    pub value: T,
    pub stored_at: PhysicalTime,
}

impl<T> CachedResult<T> {
    /// Whether the entry may still be reused at `now`.
    #[must_use]
    pub fn is_fresh(&self, now: PhysicalTime, ttl: Duration) -> bool {
        u128::from(now.millis_since(self.stored_at)) < ttl.as_millis()
    }
}

struct CoordinatorState<T> {
    /// Bumped by `reset`; completions from an older generation are ignored.
    generation: u64,
    in_flight: Option<SharedOutcome<T>>,
    cache: HashMap<String, CachedResult<T>>,
    data: Option<T>,
    error: Option<RequestError>,
    loading: bool,
}

impl<T> Default for CoordinatorState<T> {
    fn default() -> Self {
        Self {
            generation: 0,
            in_flight: None,
            cache: HashMap::new(),
            data: None,
            error: None,
            loading: false,
        }
    }
}

enum Entry<T> {
    Cached(T),
    Joined(SharedOutcome<T>),
    Started(SharedOutcome<T>),
}

/// De-duplicating, caching executor for a single remote operation.
///
/// Clones share the same in-flight marker and cache.
pub struct RequestCoordinator<T> {
    time: Arc<dyn PhysicalTimeEffects>,
    ttl: Duration,
    on_success: Option<Callback<T>>,
    on_error: Option<Callback<RequestError>>,
    state: Arc<Mutex<CoordinatorState<T>>>,
}

impl<T> Clone for RequestCoordinator<T> {
    fn clone(&self) -> Self {
        Self {
            time: Arc::clone(&self.time),
            ttl: self.ttl,
            on_success: self.on_success.clone(),
            on_error: self.on_error.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> std::fmt::Debug for RequestCoordinator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("RequestCoordinator")
            .field("ttl", &self.ttl)
            .field("generation", &state.generation)
            .field("in_flight", &state.in_flight.is_some())
            .field("cached_keys", &state.cache.len())
            .field("loading", &state.loading)
            .finish()
    }
}

impl<T> RequestCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Coordinator with the default TTL and no callbacks.
    pub fn new(time: Arc<dyn PhysicalTimeEffects>) -> Self {
        Self {
            time,
            ttl: DEFAULT_CACHE_TTL,
            on_success: None,
            on_error: None,
            state: Arc::new(Mutex::new(CoordinatorState::default())),
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    #[must_use]
    pub fn on_success(mut self, callback: impl Fn(&T) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn on_error(mut self, callback: impl Fn(&RequestError) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Run `operation`, or reuse a cached or in-flight result.
    ///
    /// With a `cache_key`, a fresh cached value is returned without invoking
    /// `operation`, and a success is stored under that key. While an
    /// execution is outstanding every caller joins it, whatever key it
    /// passed.
    ///
    /// `operation` is called while the coordinator's lock is held, so it
    /// must only construct its future, never touch this coordinator.
    pub async fn execute<F, Fut>(
        &self,
        cache_key: Option<&str>,
        operation: F,
    ) -> Result<T, RequestError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RequestError>> + Send + 'static,
    {
        let now = match cache_key {
            Some(_) => self.now().await,
            None => None,
        };

        let entry = {
            let mut state = self.state.lock();

            let hit = match (cache_key, now) {
                (Some(key), Some(now)) => state
                    .cache
                    .get(key)
                    .filter(|cached| cached.is_fresh(now, self.ttl))
                    .map(|cached| cached.value.clone()),
                _ => None,
            };

            if let Some(value) = hit {
                state.data = Some(value.clone());
                Entry::Cached(value)
            } else if let Some(outstanding) = state.in_flight.clone() {
                Entry::Joined(outstanding)
            } else {
                let generation = state.generation;
                let outcome = self.start(generation, cache_key.map(str::to_string), operation());
                state.in_flight = Some(outcome.clone());
                state.loading = true;
                Entry::Started(outcome)
            }
        };

        match entry {
            Entry::Cached(value) => {
                tracing::debug!(cache_key = ?cache_key, "Request served from cache");
                Ok(value)
            }
            Entry::Joined(outstanding) => {
                tracing::debug!("Joining in-flight request");
                outstanding.await
            }
            Entry::Started(outcome) => outcome.await,
        }
    }

    fn start<Fut>(
        &self,
        generation: u64,
        cache_key: Option<String>,
        operation: Fut,
    ) -> SharedOutcome<T>
    where
        Fut: Future<Output = Result<T, RequestError>> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let time = Arc::clone(&self.time);
        let on_success = self.on_success.clone();
        let on_error = self.on_error.clone();

        async move {
            let result = match AssertUnwindSafe(operation).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    tracing::warn!(panic = %message, "Request operation panicked");
                    Err(RequestError::new(format!("Request panicked: {message}")))
                }
            };

            let stored_at = match (&result, &cache_key) {
                (Ok(_), Some(_)) => time.physical_time().await.ok(),
                _ => None,
            };

            let current = {
                let mut state = state.lock();
                if state.generation == generation {
                    state.in_flight = None;
                    state.loading = false;
                    match &result {
                        Ok(value) => {
                            state.data = Some(value.clone());
                            state.error = None;
                            if let (Some(key), Some(stored_at)) = (cache_key, stored_at) {
                                state.cache.insert(
                                    key,
                                    CachedResult {
                                        value: value.clone(),
                                        stored_at,
                                    },
                                );
                            }
                        }
                        Err(err) => state.error = Some(err.clone()),
                    }
                    true
                } else {
                    false
                }
            };

            if !current {
                tracing::debug!(generation, "Discarding result of a request abandoned by reset");
                return result;
            }

            match &result {
                Ok(value) => {
                    if let Some(callback) = &on_success {
                        callback(value);
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, status = ?err.status_code, "Request failed");
                    if let Some(callback) = &on_error {
                        callback(err);
                    }
                }
            }
            result
        }
        .boxed()
        .shared()
    }

    async fn now(&self) -> Option<PhysicalTime> {
        match self.time.physical_time().await {
            Ok(now) => Some(now),
            Err(err) => {
                tracing::warn!(error = %err, "Clock unavailable; bypassing response cache");
                None
            }
        }
    }

    /// Drop cache, data, error, loading flag and in-flight marker.
    ///
    /// An outstanding execution keeps running; its result goes only to the
    /// callers already awaiting it.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let generation = state.generation.wrapping_add(1);
        *state = CoordinatorState {
            generation,
            ..CoordinatorState::default()
        };
    }

    /// Forget the entry for `key`.
    pub fn invalidate(&self, key: &str) {
        self.state.lock().cache.remove(key);
    }

    /// Forget every cached entry; data and in-flight state are kept.
    pub fn clear_cache(&self) {
        self.state.lock().cache.clear();
    }

    /// Fresh cached value for `key`, if any.
    pub async fn cached(&self, key: &str) -> Option<T> {
        let now = self.now().await?;
        let state = self.state.lock();
        state
            .cache
            .get(key)
            .filter(|cached| cached.is_fresh(now, self.ttl))
            .map(|cached| cached.value.clone())
    }

    /// Last successful value.
    #[must_use]
    pub fn data(&self) -> Option<T> {
        self.state.lock().data.clone()
    }

    /// Error of the last completed execution, cleared by the next success.
    #[must_use]
    pub fn error(&self) -> Option<RequestError> {
        self.state.lock().error.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use laurel_testkit::ControllableClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    fn coordinator(clock: &ControllableClock) -> RequestCoordinator<String> {
        RequestCoordinator::new(Arc::new(clock.clone()))
    }

    fn counted(
        calls: &Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<String, RequestError>> {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(value.to_string()) }.boxed()
        }
    }

    #[tokio::test]
    async fn concurrent_calls_share_one_execution() {
        let clock = ControllableClock::default();
        let coordinator = coordinator(&clock);
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = oneshot::channel::<String>();

        let first = {
            let coordinator = coordinator.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                coordinator
                    .execute(None, move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async move { gate.await.map_err(|e| RequestError::from_error(&e)) }
                    })
                    .await
            })
        };
        while !coordinator.is_loading() {
            tokio::task::yield_now().await;
        }

        let second = coordinator.execute(None, counted(&calls, "second"));
        tokio::pin!(second);
        assert!(futures::poll!(second.as_mut()).is_pending());

        release.send("shared".to_string()).unwrap();
        assert_eq!(first.await.unwrap().unwrap(), "shared");
        assert_eq!(second.await.unwrap(), "shared");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!coordinator.is_loading());
    }

    #[tokio::test]
    async fn cache_respects_ttl() {
        let clock = ControllableClock::default();
        let coordinator = coordinator(&clock);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = coordinator.execute(Some("skills"), counted(&calls, "v1")).await;
        assert_eq!(first.unwrap(), "v1");

        clock.advance(Duration::from_secs(4 * 60 + 59));
        let value = coordinator.execute(Some("skills"), counted(&calls, "never")).await;
        assert_eq!(value.unwrap(), "v1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(1));
        assert_eq!(coordinator.cached("skills").await, None);
        let refreshed = coordinator.execute(Some("skills"), counted(&calls, "v2")).await;
        assert_eq!(refreshed.unwrap(), "v2");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn keys_are_independent_and_invalidatable() {
        let clock = ControllableClock::default();
        let coordinator = coordinator(&clock);

        coordinator
            .execute(Some("a"), || async { Ok("A".to_string()) })
            .await
            .unwrap();
        assert_eq!(coordinator.cached("a").await.as_deref(), Some("A"));
        assert_eq!(coordinator.cached("b").await, None);

        coordinator.invalidate("a");
        let value = coordinator
            .execute(Some("a"), || async { Ok("A2".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "A2");
    }

    #[tokio::test]
    async fn plain_failure_keeps_message_without_status() {
        let clock = ControllableClock::default();
        let coordinator = coordinator(&clock);

        let err = coordinator
            .execute(None, || async {
                let cause = std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout");
                Err(RequestError::from_error(&cause))
            })
            .await
            .unwrap_err();

        assert_eq!(err.message, "timeout");
        assert_eq!(err.status_code, None);
        assert_eq!(err.response_body, None);
        assert_eq!(coordinator.error(), Some(err));
        assert!(!coordinator.is_loading());
    }

    async fn explode() -> Result<String, RequestError> {
        panic!("decoder blew up")
    }

    #[tokio::test]
    async fn panicking_operation_becomes_error_and_frees_the_slot() {
        let clock = ControllableClock::default();
        let failures = Arc::new(AtomicUsize::new(0));
        let coordinator = {
            let failures = failures.clone();
            coordinator(&clock).on_error(move |_| {
                failures.fetch_add(1, Ordering::SeqCst);
            })
        };

        let err = coordinator
            .execute(Some("k"), explode)
            .await
            .unwrap_err();
        assert_eq!(err.message, "Request panicked: decoder blew up");
        assert_eq!(err.status_code, None);
        assert!(!coordinator.is_loading());
        assert_eq!(coordinator.error(), Some(err));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.cached("k").await, None);

        let value = coordinator
            .execute(Some("k"), || async { Ok("fresh".to_string()) })
            .await
            .unwrap();
        assert_eq!(value, "fresh");
        assert_eq!(coordinator.error(), None);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let clock = ControllableClock::default();
        let coordinator = coordinator(&clock);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let _ = coordinator
                .execute(Some("k"), move || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err::<String, _>(RequestError::new("boom")) }
                })
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn callbacks_fire_once_per_real_execution() {
        let clock = ControllableClock::default();
        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));
        let coordinator = {
            let successes = successes.clone();
            let failures = failures.clone();
            coordinator(&clock)
                .on_success(move |_| {
                    successes.fetch_add(1, Ordering::SeqCst);
                })
                .on_error(move |_| {
                    failures.fetch_add(1, Ordering::SeqCst);
                })
        };

        coordinator
            .execute(Some("k"), || async { Ok("v".to_string()) })
            .await
            .unwrap();
        coordinator
            .execute(Some("k"), || async { Ok("cached".to_string()) })
            .await
            .unwrap();
        let _ = coordinator
            .execute(None, || async { Err::<String, _>(RequestError::new("no")) })
            .await;

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_hit_leaves_loading_untouched() {
        let clock = ControllableClock::default();
        let coordinator = coordinator(&clock);
        coordinator
            .execute(Some("k"), || async { Ok("v".to_string()) })
            .await
            .unwrap();

        let hit = coordinator.execute(Some("k"), || async { Ok("x".to_string()) });
        tokio::pin!(hit);
        let polled = futures::poll!(hit.as_mut());
        assert!(matches!(polled, std::task::Poll::Ready(Ok(ref v)) if v == "v"));
        assert!(!coordinator.is_loading());
        assert_eq!(coordinator.data().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn reset_mid_flight_abandons_the_result() {
        let clock = ControllableClock::default();
        let fired = Arc::new(AtomicUsize::new(0));
        let coordinator = {
            let fired = fired.clone();
            coordinator(&clock).on_success(move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        let (release, gate) = oneshot::channel::<String>();

        let pending = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .execute(Some("k"), move || async move {
                        gate.await.map_err(|e| RequestError::from_error(&e))
                    })
                    .await
            })
        };
        while !coordinator.is_loading() {
            tokio::task::yield_now().await;
        }

        coordinator.reset();
        assert!(!coordinator.is_loading());

        release.send("late".to_string()).unwrap();
        assert_eq!(pending.await.unwrap().unwrap(), "late");

        assert_eq!(coordinator.data(), None);
        assert_eq!(coordinator.cached("k").await, None);
        assert!(!coordinator.is_loading());
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        let fresh = coordinator
            .execute(Some("k"), || async { Ok("fresh".to_string()) })
            .await
            .unwrap();
        assert_eq!(fresh, "fresh");
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
