//! Layer 3: App lifecycle signal
//!
//! The platform shell forwards its app-state callbacks into
//! [`LifecycleSignal::emit`]; observers subscribe through
//! `AppLifecycleEffects`.

use laurel_core::effects::{AppLifecycleEffects, AppState};
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Transitions buffered per observer before the slowest one starts lagging.
const CHANNEL_CAPACITY: usize = 16;

/// Broadcast hub for app-state transitions.
#[derive(Debug)]
pub struct LifecycleSignal {
    sender: broadcast::Sender<AppState>,
    current: Mutex<AppState>,
}

impl LifecycleSignal {
    /// Create a signal whose initial state is `Active`.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            current: Mutex::new(AppState::Active),
        }
    }

    /// Report a platform transition.
    ///
    /// Repeated reports of the current state are forwarded too; observers are
    /// required to treat them idempotently.
    pub fn emit(&self, state: AppState) {
        let previous = std::mem::replace(&mut *self.current.lock(), state);
        tracing::debug!(from = %previous, to = %state, "app state transition");
        // No receivers is fine: nobody is observing yet.
        let _ = self.sender.send(state);
    }

    /// Number of live observers.
    pub fn observer_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LifecycleSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl AppLifecycleEffects for LifecycleSignal {
    fn subscribe(&self) -> broadcast::Receiver<AppState> {
        self.sender.subscribe()
    }

    fn current_state(&self) -> AppState {
        *self.current.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_reaches_subscribers() {
        let signal = LifecycleSignal::new();
        let mut rx = signal.subscribe();
        signal.emit(AppState::Background);
        assert_eq!(rx.recv().await.unwrap(), AppState::Background);
        assert_eq!(signal.current_state(), AppState::Background);
    }

    #[test]
    fn test_dropping_receiver_unsubscribes() {
        let signal = LifecycleSignal::new();
        let rx = signal.subscribe();
        assert_eq!(signal.observer_count(), 1);
        drop(rx);
        assert_eq!(signal.observer_count(), 0);
        signal.emit(AppState::Inactive);
        assert_eq!(signal.current_state(), AppState::Inactive);
    }
}
