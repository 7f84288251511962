//! # Auth Session Context
//!
//! The single owner of in-memory session state: who is signed in, their
//! credentials, and their profile once fetched. Composes the credential
//! store, one lifecycle manager per authenticated session, and a
//! de-duplicated profile fetch.
//!
//! Every clearing event (sign-out, expiry, a 401 from the profile fetch)
//! resets credentials, profile and the fetched flag together. Each new
//! session bumps an epoch; profile fetches and expiry callbacks that belong
//! to an older epoch are discarded.
//!
//! Widgets read state through [`AuthSessionContext::snapshot`] or
//! [`AuthSessionContext::subscribe`] and never mutate it directly.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use laurel_core::effects::{AppLifecycleEffects, AppState, PhysicalTimeEffects};
use laurel_core::{LaurelError, RequestError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::credentials::{SecureCredentialStore, StoredAuthData};
use crate::lifecycle::{LifecycleConfig, LifecyclePhase, SessionLifecycleManager};
use crate::request::RequestCoordinator;

/// The signed-in user's profile. Fields beyond identity are kept opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_key: String,
    pub username: String,
    pub email: String,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

/// Where profiles come from.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// Fetch the current user's profile with the stored credentials.
    async fn fetch_profile(&self) -> Result<UserProfile, RequestError>;
}

/// Snapshot of the session, as seen by widgets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub credentials: Option<StoredAuthData>,
    pub user_profile: Option<UserProfile>,
    /// A profile has been successfully fetched for this session.
    pub profile_fetched: bool,
}

struct SessionInner {
    session: SessionState,
    epoch: u64,
    manager: Option<SessionLifecycleManager>,
}

struct SessionShared {
    credentials: SecureCredentialStore,
    profiles: Arc<dyn ProfileSource>,
    time: Arc<dyn PhysicalTimeEffects>,
    lifecycle_source: Option<Arc<dyn AppLifecycleEffects>>,
    lifecycle_config: LifecycleConfig,
    profile_requests: RequestCoordinator<UserProfile>,
    inner: Mutex<SessionInner>,
    updates: watch::Sender<SessionState>,
}

/// Process-wide source of truth for "who is logged in".
///
/// Clones share state.
#[derive(Clone)]
pub struct AuthSessionContext {
    shared: Arc<SessionShared>,
}

impl std::fmt::Debug for AuthSessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("AuthSessionContext")
            .field("is_authenticated", &inner.session.is_authenticated)
            .field("profile_fetched", &inner.session.profile_fetched)
            .field("epoch", &inner.epoch)
            .finish_non_exhaustive()
    }
}

impl AuthSessionContext {
    /// Create an unauthenticated context.
    ///
    /// With a `lifecycle_source`, every session's lifecycle manager observes
    /// it; without one, transitions are fed through
    /// [`handle_app_state`](Self::handle_app_state).
    pub fn new(
        credentials: SecureCredentialStore,
        profiles: Arc<dyn ProfileSource>,
        time: Arc<dyn PhysicalTimeEffects>,
        lifecycle_source: Option<Arc<dyn AppLifecycleEffects>>,
        lifecycle_config: LifecycleConfig,
    ) -> Self {
        let (updates, _) = watch::channel(SessionState::default());
        Self {
            shared: Arc::new(SessionShared {
                profile_requests: RequestCoordinator::new(Arc::clone(&time)),
                credentials,
                profiles,
                time,
                lifecycle_source,
                lifecycle_config,
                inner: Mutex::new(SessionInner {
                    session: SessionState::default(),
                    epoch: 0,
                    manager: None,
                }),
                updates,
            }),
        }
    }

    // ========================================================================
    // Session operations
    // ========================================================================

    /// Cold-start hydration from the credential store.
    ///
    /// Stored credentials are trusted without asking the server; a rejected
    /// token surfaces on the first authenticated call.
    pub async fn check_auth_status(&self) -> bool {
        match self.shared.credentials.load().await {
            Some(data) => {
                tracing::info!(user_key = %data.user_key, "Restored session from secure storage");
                self.shared.begin_session(data);
                true
            }
            None => {
                self.shared.collapse(None);
                false
            }
        }
    }

    /// Persist credentials and start a new session with them.
    ///
    /// Nothing changes in memory if the credentials could not be stored.
    pub async fn set_auth_data(&self, data: StoredAuthData) -> Result<(), LaurelError> {
        self.shared.credentials.store(&data).await?;
        tracing::info!(user_key = %data.user_key, "Signed in");
        self.shared.begin_session(data);
        Ok(())
    }

    /// The current user's profile, fetched at most once per session.
    ///
    /// Concurrent callers share one fetch. Returns `None` when signed out,
    /// when the fetch fails, and when the session changed while fetching.
    /// A 401 ends the session.
    pub async fn get_user_profile(&self) -> Option<UserProfile> {
        let epoch = {
            let inner = self.shared.inner.lock();
            if !inner.session.is_authenticated {
                return None;
            }
            if inner.session.profile_fetched {
                return inner.session.user_profile.clone();
            }
            inner.epoch
        };

        let profiles = Arc::clone(&self.shared.profiles);
        let result = self
            .shared
            .profile_requests
            .execute(None, move || async move { profiles.fetch_profile().await })
            .await;

        match result {
            Ok(profile) => {
                let snapshot = {
                    let mut inner = self.shared.inner.lock();
                    if inner.epoch != epoch {
                        tracing::debug!(epoch, "Discarding profile fetched for an ended session");
                        return None;
                    }
                    if inner.session.profile_fetched {
                        return inner.session.user_profile.clone();
                    }
                    inner.session.user_profile = Some(profile.clone());
                    inner.session.profile_fetched = true;
                    inner.session.clone()
                };
                self.shared.publish(snapshot);
                Some(profile)
            }
            Err(err) if err.is_unauthorized() => {
                let current = self.shared.inner.lock().epoch == epoch;
                if current {
                    tracing::warn!("Profile fetch rejected credentials; signing out");
                    if let Err(clear_err) = self.clear_auth().await {
                        tracing::warn!(error = %clear_err, "Failed to clear rejected credentials");
                    }
                }
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, status = ?err.status_code, "Profile fetch failed");
                None
            }
        }
    }

    /// Sign out: collapse in-memory state, then clear the credential store.
    ///
    /// Idempotent. The in-memory session is gone even when the store could
    /// not be cleared; that failure is returned.
    pub async fn clear_auth(&self) -> Result<(), LaurelError> {
        if self.shared.collapse(None) {
            tracing::info!("Signed out");
        }
        self.shared.credentials.clear().await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Forward an app-state transition to the current session's manager.
    pub fn handle_app_state(&self, app_state: AppState) {
        let inner = self.shared.inner.lock();
        if let Some(manager) = &inner.manager {
            manager.handle_app_state(app_state);
        }
    }

    /// Phase of the current session's lifecycle manager.
    #[must_use]
    pub fn lifecycle_phase(&self) -> Option<LifecyclePhase> {
        self.shared.inner.lock().manager.as_ref().map(SessionLifecycleManager::phase)
    }

    // ========================================================================
    // Read access
    // ========================================================================

    #[must_use]
    pub fn snapshot(&self) -> SessionState {
        self.shared.inner.lock().session.clone()
    }

    /// Receiver that sees every session change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.updates.subscribe()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.shared.inner.lock().session.is_authenticated
    }

    #[must_use]
    pub fn user_profile(&self) -> Option<UserProfile> {
        self.shared.inner.lock().session.user_profile.clone()
    }

    /// Bearer header value for the in-memory session.
    #[must_use]
    pub fn authorization_header_value(&self) -> Option<String> {
        self.shared
            .inner
            .lock()
            .session
            .credentials
            .as_ref()
            .map(StoredAuthData::authorization_header_value)
    }
}

impl SessionShared {
    fn begin_session(self: &Arc<Self>, data: StoredAuthData) {
        let (previous, snapshot) = {
            let mut inner = self.inner.lock();
            inner.epoch += 1;
            let epoch = inner.epoch;

            let weak: Weak<SessionShared> = Arc::downgrade(self);
            let manager = SessionLifecycleManager::new(
                self.credentials.clone(),
                Arc::clone(&self.time),
                self.lifecycle_config,
                Arc::new(move || {
                    if let Some(shared) = weak.upgrade() {
                        if shared.collapse(Some(epoch)) {
                            tracing::info!("Session expired while in background");
                        }
                    }
                }),
            );
            if let Some(source) = &self.lifecycle_source {
                manager.attach(source.as_ref());
            }

            inner.session = SessionState {
                is_authenticated: true,
                credentials: Some(data),
                user_profile: None,
                profile_fetched: false,
            };
            (inner.manager.replace(manager), inner.session.clone())
        };

        drop(previous);
        self.profile_requests.reset();
        self.publish(snapshot);
    }

    /// Drop the in-memory session. With `expected_epoch`, only if that epoch
    /// is still current. Returns whether a session was collapsed.
    fn collapse(&self, expected_epoch: Option<u64>) -> bool {
        let (manager, was_authenticated) = {
            let mut inner = self.inner.lock();
            if expected_epoch.is_some_and(|epoch| epoch != inner.epoch) {
                return false;
            }
            let was_authenticated = inner.session.is_authenticated;
            if was_authenticated {
                inner.epoch += 1;
            }
            inner.session = SessionState::default();
            (inner.manager.take(), was_authenticated)
        };

        drop(manager);
        if was_authenticated {
            self.profile_requests.reset();
            self.publish(SessionState::default());
        }
        was_authenticated
    }

    fn publish(&self, snapshot: SessionState) {
        self.updates.send_replace(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::TOKEN_KEY;
    use laurel_effects::LifecycleSignal;
    use laurel_testkit::{ControllableClock, MockSecureStorage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct StubProfiles {
        calls: AtomicUsize,
        latency: Option<Duration>,
        response: Mutex<Result<UserProfile, RequestError>>,
    }

    impl StubProfiles {
        fn answering(response: Result<UserProfile, RequestError>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                latency: None,
                response: Mutex::new(response),
            })
        }

        fn slow(response: Result<UserProfile, RequestError>, latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                latency: Some(latency),
                response: Mutex::new(response),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProfileSource for StubProfiles {
        async fn fetch_profile(&self) -> Result<UserProfile, RequestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            self.response.lock().clone()
        }
    }

    fn profile(username: &str) -> UserProfile {
        UserProfile {
            user_key: format!("key-{username}"),
            username: username.into(),
            email: format!("{username}@example.com"),
            attributes: serde_json::Map::new(),
        }
    }

    fn auth(username: &str) -> StoredAuthData {
        StoredAuthData {
            token: format!("tok-{username}"),
            token_type: "Bearer".into(),
            user_key: format!("key-{username}"),
            username: username.into(),
            email: format!("{username}@example.com"),
        }
    }

    fn context(
        storage: &MockSecureStorage,
        profiles: Arc<StubProfiles>,
        source: Option<Arc<dyn AppLifecycleEffects>>,
    ) -> AuthSessionContext {
        AuthSessionContext::new(
            SecureCredentialStore::new(Arc::new(storage.clone())),
            profiles,
            Arc::new(ControllableClock::default()),
            source,
            LifecycleConfig::default(),
        )
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn cold_start_hydrates_without_network() {
        let storage = MockSecureStorage::new();
        SecureCredentialStore::new(Arc::new(storage.clone()))
            .store(&auth("ada"))
            .await
            .unwrap();
        let profiles = StubProfiles::answering(Ok(profile("ada")));
        let ctx = context(&storage, profiles.clone(), None);

        assert!(ctx.check_auth_status().await);
        let state = ctx.snapshot();
        assert!(state.is_authenticated);
        assert_eq!(state.credentials, Some(auth("ada")));
        assert!(!state.profile_fetched);
        assert_eq!(profiles.calls(), 0);
        assert_eq!(ctx.authorization_header_value().as_deref(), Some("Bearer tok-ada"));
        assert_eq!(ctx.lifecycle_phase(), Some(LifecyclePhase::Active));
    }

    #[tokio::test]
    async fn cold_start_without_credentials_is_signed_out() {
        let storage = MockSecureStorage::new();
        let ctx = context(&storage, StubProfiles::answering(Ok(profile("ada"))), None);
        assert!(!ctx.check_auth_status().await);
        assert_eq!(ctx.snapshot(), SessionState::default());
        assert_eq!(ctx.lifecycle_phase(), None);
    }

    #[tokio::test]
    async fn set_auth_data_failure_changes_nothing() {
        let storage = MockSecureStorage::new();
        storage.fail_writes_after(0);
        let ctx = context(&storage, StubProfiles::answering(Ok(profile("ada"))), None);
        assert!(ctx.set_auth_data(auth("ada")).await.is_err());
        assert!(!ctx.is_authenticated());
    }

    #[tokio::test]
    async fn profile_is_fetched_once_per_session() {
        let storage = MockSecureStorage::new();
        let profiles = StubProfiles::answering(Ok(profile("ada")));
        let ctx = context(&storage, profiles.clone(), None);

        assert_eq!(ctx.get_user_profile().await, None);
        ctx.set_auth_data(auth("ada")).await.unwrap();

        assert_eq!(ctx.get_user_profile().await, Some(profile("ada")));
        assert_eq!(ctx.get_user_profile().await, Some(profile("ada")));
        assert_eq!(profiles.calls(), 1);
        assert!(ctx.snapshot().profile_fetched);

        ctx.clear_auth().await.unwrap();
        ctx.set_auth_data(auth("ada")).await.unwrap();
        assert_eq!(ctx.user_profile(), None);
        ctx.get_user_profile().await;
        assert_eq!(profiles.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_profile_requests_share_one_fetch() {
        let storage = MockSecureStorage::new();
        let profiles = StubProfiles::slow(Ok(profile("ada")), Duration::from_secs(1));
        let ctx = context(&storage, profiles.clone(), None);
        ctx.set_auth_data(auth("ada")).await.unwrap();

        let (a, b) = tokio::join!(ctx.get_user_profile(), ctx.get_user_profile());
        assert_eq!(a, Some(profile("ada")));
        assert_eq!(b, Some(profile("ada")));
        assert_eq!(profiles.calls(), 1);
    }

    #[tokio::test]
    async fn failed_fetch_can_be_retried() {
        let storage = MockSecureStorage::new();
        let profiles = StubProfiles::answering(Err(RequestError::new("offline")));
        let ctx = context(&storage, profiles.clone(), None);
        ctx.set_auth_data(auth("ada")).await.unwrap();

        assert_eq!(ctx.get_user_profile().await, None);
        assert!(ctx.is_authenticated());
        *profiles.response.lock() = Ok(profile("ada"));
        assert_eq!(ctx.get_user_profile().await, Some(profile("ada")));
        assert_eq!(profiles.calls(), 2);
    }

    #[tokio::test]
    async fn unauthorized_profile_fetch_signs_out() {
        let storage = MockSecureStorage::new();
        let rejected = RequestError::from_response(401, r#"{"message":"Token expired"}"#);
        let ctx = context(&storage, StubProfiles::answering(Err(rejected)), None);
        ctx.set_auth_data(auth("ada")).await.unwrap();

        assert_eq!(ctx.get_user_profile().await, None);
        assert!(!ctx.is_authenticated());
        assert!(storage.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_from_ended_session_is_discarded() {
        let storage = MockSecureStorage::new();
        let profiles = StubProfiles::slow(Ok(profile("ada")), Duration::from_secs(1));
        let ctx = context(&storage, profiles.clone(), None);
        ctx.set_auth_data(auth("ada")).await.unwrap();

        let stale = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.get_user_profile().await })
        };
        settle().await;

        ctx.clear_auth().await.unwrap();
        ctx.set_auth_data(auth("grace")).await.unwrap();

        assert_eq!(stale.await.unwrap(), None);
        let state = ctx.snapshot();
        assert_eq!(state.user_profile, None);
        assert!(!state.profile_fetched);
        assert_eq!(state.credentials.map(|c| c.username), Some("grace".to_string()));
    }

    #[tokio::test]
    async fn clear_auth_is_idempotent() {
        let storage = MockSecureStorage::new();
        let ctx = context(&storage, StubProfiles::answering(Ok(profile("ada"))), None);
        ctx.set_auth_data(auth("ada")).await.unwrap();
        ctx.get_user_profile().await;

        ctx.clear_auth().await.unwrap();
        let once = ctx.snapshot();
        ctx.clear_auth().await.unwrap();
        assert_eq!(ctx.snapshot(), once);
        assert_eq!(once, SessionState::default());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn subscribers_see_changes() {
        let storage = MockSecureStorage::new();
        let ctx = context(&storage, StubProfiles::answering(Ok(profile("ada"))), None);
        let mut updates = ctx.subscribe();

        ctx.set_auth_data(auth("ada")).await.unwrap();
        updates.changed().await.unwrap();
        assert!(updates.borrow_and_update().is_authenticated);

        ctx.clear_auth().await.unwrap();
        updates.changed().await.unwrap();
        assert!(!updates.borrow_and_update().is_authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn background_expiry_collapses_session() {
        let storage = MockSecureStorage::new();
        let signal = Arc::new(LifecycleSignal::new());
        let source: Arc<dyn AppLifecycleEffects> = signal.clone();
        let ctx = context(&storage, StubProfiles::answering(Ok(profile("ada"))), Some(source));
        ctx.set_auth_data(auth("ada")).await.unwrap();
        ctx.get_user_profile().await;
        settle().await;

        signal.emit(AppState::Background);
        settle().await;
        assert_eq!(ctx.lifecycle_phase(), Some(LifecyclePhase::BackgroundedTiming));

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        settle().await;

        assert_eq!(ctx.snapshot(), SessionState::default());
        assert_eq!(storage.peek(TOKEN_KEY), None);
        assert_eq!(ctx.lifecycle_phase(), None);

        signal.emit(AppState::Active);
        settle().await;
        assert!(!ctx.is_authenticated());
        assert_eq!(signal.observer_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn sign_in_during_expiry_clear_keeps_new_credentials() {
        let storage = MockSecureStorage::new();
        storage.set_latency(Duration::from_millis(50));
        let ctx = context(&storage, StubProfiles::answering(Ok(profile("ada"))), None);
        ctx.set_auth_data(auth("ada")).await.unwrap();
        ctx.handle_app_state(AppState::Background);
        settle().await;

        tokio::time::advance(Duration::from_secs(5 * 60)).await;
        settle().await;
        assert_eq!(ctx.lifecycle_phase(), Some(LifecyclePhase::BackgroundedExpired));

        ctx.set_auth_data(auth("grace")).await.unwrap();
        settle().await;

        assert!(ctx.is_authenticated());
        assert_eq!(ctx.snapshot().credentials, Some(auth("grace")));
        let persisted = SecureCredentialStore::new(Arc::new(storage.clone()));
        assert_eq!(persisted.load().await, Some(auth("grace")));
        assert_eq!(
            persisted.authorization_header_value().await.as_deref(),
            Some("Bearer tok-grace")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_sign_in_keeps_new_credentials() {
        let storage = MockSecureStorage::new();
        storage.set_latency(Duration::from_millis(50));
        let ctx = context(&storage, StubProfiles::answering(Ok(profile("ada"))), None);
        ctx.set_auth_data(auth("ada")).await.unwrap();
        ctx.handle_app_state(AppState::Background);
        settle().await;
        tokio::time::advance(Duration::from_secs(5 * 60) - Duration::from_millis(100)).await;
        settle().await;

        let deletes = storage.delete_calls();
        let signing_in = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.set_auth_data(auth("grace")).await })
        };
        while storage.delete_calls() == deletes {
            tokio::task::yield_now().await;
        }
        tokio::time::advance(Duration::from_millis(200)).await;
        signing_in.await.unwrap().unwrap();
        settle().await;

        assert!(ctx.is_authenticated());
        assert_eq!(ctx.snapshot().credentials, Some(auth("grace")));
        assert_eq!(ctx.lifecycle_phase(), Some(LifecyclePhase::Active));
        let persisted = SecureCredentialStore::new(Arc::new(storage.clone()));
        assert_eq!(persisted.load().await, Some(auth("grace")));
    }

    #[tokio::test(start_paused = true)]
    async fn new_session_replaces_old_timer() {
        let storage = MockSecureStorage::new();
        let ctx = context(&storage, StubProfiles::answering(Ok(profile("ada"))), None);
        ctx.set_auth_data(auth("ada")).await.unwrap();
        ctx.handle_app_state(AppState::Background);
        settle().await;

        ctx.set_auth_data(auth("grace")).await.unwrap();
        tokio::time::advance(Duration::from_secs(10 * 60)).await;
        settle().await;

        assert!(ctx.is_authenticated());
        assert_eq!(ctx.lifecycle_phase(), Some(LifecyclePhase::Active));
        assert!(storage.peek(TOKEN_KEY).is_some());
    }
}
