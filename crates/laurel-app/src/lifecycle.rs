//! # Session Lifecycle Manager
//!
//! Watches foreground/background transitions and revokes the session after
//! the app has been away for longer than the background timeout.
//!
//! ```text
//! Active ──away──▶ BackgroundedTiming ──deadline──▶ BackgroundedExpired
//!    ▲                    │
//!    └─────foreground─────┘
//! ```
//!
//! `Background` and `Inactive` both count as away. An away event while the
//! timer is running is ignored, so there is never more than one live timer.
//! `BackgroundedExpired` is terminal: the next sign-in builds a new manager.
//!
//! On expiry the credential store is cleared first (a failure is logged and
//! does not stop the transition), then the expiry callback collapses the
//! in-memory session. The clear targets the bundle revision current at the
//! deadline, so credentials stored by a sign-in that overlaps the expiry
//! survive it.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` for phase and task handles because the lock is
//! never held across `.await` and guards only O(1) updates.

use std::sync::{Arc, Weak};
use std::time::Duration;

use laurel_core::effects::{AppLifecycleEffects, AppState, PhysicalTimeEffects};
use laurel_core::SessionConfig;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::credentials::SecureCredentialStore;

/// Default time the app may stay away before the session is revoked.
pub const DEFAULT_BACKGROUND_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Called once the session has expired and the store has been cleared.
pub type ExpiryCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Active,
    /// Away, deadline timer running.
    BackgroundedTiming,
    /// Deadline elapsed; credentials cleared. Terminal.
    BackgroundedExpired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub background_timeout: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            background_timeout: DEFAULT_BACKGROUND_TIMEOUT,
        }
    }
}

impl From<&SessionConfig> for LifecycleConfig {
    fn from(config: &SessionConfig) -> Self {
        Self {
            background_timeout: config.background_timeout(),
        }
    }
}

struct LifecycleState {
    phase: LifecyclePhase,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every timer start and cancel; a timer only expires the
    /// episode it was started for.
    episode: u64,
    observer: Option<JoinHandle<()>>,
    shut_down: bool,
}

struct LifecycleShared {
    credentials: SecureCredentialStore,
    time: Arc<dyn PhysicalTimeEffects>,
    config: LifecycleConfig,
    on_expired: ExpiryCallback,
    state: Mutex<LifecycleState>,
}

/// Inactivity-timeout enforcer for one authenticated session.
///
/// Dropping the manager cancels the timer and the observer task.
pub struct SessionLifecycleManager {
    shared: Arc<LifecycleShared>,
}

impl std::fmt::Debug for SessionLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("SessionLifecycleManager")
            .field("phase", &state.phase)
            .field("timer_live", &state.timer.is_some())
            .field("observing", &state.observer.is_some())
            .field("timeout", &self.shared.config.background_timeout)
            .finish()
    }
}

impl SessionLifecycleManager {
    pub fn new(
        credentials: SecureCredentialStore,
        time: Arc<dyn PhysicalTimeEffects>,
        config: LifecycleConfig,
        on_expired: ExpiryCallback,
    ) -> Self {
        Self {
            shared: Arc::new(LifecycleShared {
                credentials,
                time,
                config,
                on_expired,
                state: Mutex::new(LifecycleState {
                    phase: LifecyclePhase::Active,
                    timer: None,
                    episode: 0,
                    observer: None,
                    shut_down: false,
                }),
            }),
        }
    }

    /// Start observing `source`.
    ///
    /// The source's current state is applied immediately, so attaching while
    /// the app is already away starts the timer. Attaching again replaces the
    /// previous observer. Must be called inside a tokio runtime.
    pub fn attach(&self, source: &dyn AppLifecycleEffects) {
        let receiver = source.subscribe();
        let weak = Arc::downgrade(&self.shared);
        let observer = tokio::spawn(observe(weak, receiver));

        {
            let mut state = self.shared.state.lock();
            if state.shut_down {
                observer.abort();
                return;
            }
            if let Some(previous) = state.observer.replace(observer) {
                previous.abort();
            }
        }

        self.shared.handle(source.current_state());
    }

    /// Apply one app-state transition. Must be called inside a tokio runtime.
    pub fn handle_app_state(&self, app_state: AppState) {
        self.shared.handle(app_state);
    }

    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        self.shared.state.lock().phase
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.shared.config.background_timeout
    }

    /// Cancel the timer and stop observing. Idempotent.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

impl Drop for SessionLifecycleManager {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

async fn observe(weak: Weak<LifecycleShared>, mut receiver: broadcast::Receiver<AppState>) {
    loop {
        match receiver.recv().await {
            Ok(app_state) => match weak.upgrade() {
                Some(shared) => shared.handle(app_state),
                None => break,
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Lifecycle observer lagged behind app-state transitions");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

impl LifecycleShared {
    fn handle(self: &Arc<Self>, app_state: AppState) {
        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }

        match (state.phase, app_state.is_away()) {
            (LifecyclePhase::Active, true) => {
                state.episode += 1;
                let episode = state.episode;
                let weak = Arc::downgrade(self);
                let time = Arc::clone(&self.time);
                let timeout = self.config.background_timeout;
                state.timer = Some(tokio::spawn(run_timer(weak, time, timeout, episode)));
                state.phase = LifecyclePhase::BackgroundedTiming;
                tracing::debug!(
                    app_state = %app_state,
                    timeout_ms = timeout.as_millis() as u64,
                    "Background timer started"
                );
            }
            (LifecyclePhase::BackgroundedTiming, true) => {
                tracing::debug!(app_state = %app_state, "Background timer already running");
            }
            (LifecyclePhase::BackgroundedTiming, false) => {
                state.episode += 1;
                if let Some(timer) = state.timer.take() {
                    timer.abort();
                }
                state.phase = LifecyclePhase::Active;
                tracing::debug!("Returned to foreground before deadline; timer cancelled");
            }
            (LifecyclePhase::Active, false) => {}
            (LifecyclePhase::BackgroundedExpired, _) => {
                tracing::debug!(
                    app_state = %app_state,
                    "Session already expired; ignoring transition"
                );
            }
        }
    }

    async fn expire(&self, episode: u64) {
        let revision = {
            let mut state = self.state.lock();
            if state.shut_down
                || state.phase != LifecyclePhase::BackgroundedTiming
                || state.episode != episode
            {
                return;
            }
            state.phase = LifecyclePhase::BackgroundedExpired;
            // This task is the timer; detach rather than abort it.
            state.timer = None;
            self.credentials.revision()
        };

        tracing::info!(
            timeout_ms = self.config.background_timeout.as_millis() as u64,
            "Session expired after background timeout"
        );
        match self.credentials.clear_revision(revision).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!("Credentials replaced before expiry clear; kept"),
            Err(err) => tracing::warn!(
                error = %err,
                "Failed to clear credentials on expiry; collapsing session anyway"
            ),
        }

        if self.state.lock().shut_down {
            return;
        }
        (self.on_expired)();
    }

    fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if let Some(observer) = state.observer.take() {
            observer.abort();
        }
    }
}

async fn run_timer(
    weak: Weak<LifecycleShared>,
    time: Arc<dyn PhysicalTimeEffects>,
    timeout: Duration,
    episode: u64,
) {
    let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
    if let Err(err) = time.sleep_ms(timeout_ms).await {
        tracing::warn!(error = %err, "Background timer failed; session left intact");
        return;
    }
    if let Some(shared) = weak.upgrade() {
        shared.expire(episode).await;
    }
}
