//! App lifecycle signal.
//!
//! The platform reports foreground/background transitions; the session
//! lifecycle manager is the only consumer. Subscribing returns a broadcast
//! receiver and dropping that receiver is the unsubscribe.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Application state as reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    /// App is in the foreground and receiving input
    Active,
    /// App is fully backgrounded
    Background,
    /// App is visible but not receiving input (transitioning, system overlay)
    Inactive,
}

impl AppState {
    /// Whether this state counts as "away" for session timing.
    ///
    /// Both `Background` and `Inactive` start the inactivity deadline.
    #[must_use]
    pub fn is_away(self) -> bool {
        matches!(self, Self::Background | Self::Inactive)
    }

    /// Short label for logs.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Background => "background",
            Self::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Source of app lifecycle transitions.
pub trait AppLifecycleEffects: Send + Sync {
    /// Register an observer. Each transition is delivered once per receiver.
    fn subscribe(&self) -> broadcast::Receiver<AppState>;

    /// The most recently reported state.
    fn current_state(&self) -> AppState;
}

impl<T: AppLifecycleEffects + ?Sized> AppLifecycleEffects for std::sync::Arc<T> {
    fn subscribe(&self) -> broadcast::Receiver<AppState> {
        (**self).subscribe()
    }

    fn current_state(&self) -> AppState {
        (**self).current_state()
    }
}
