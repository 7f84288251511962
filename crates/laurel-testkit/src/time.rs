//! Controllable time source for deterministic testing

use async_trait::async_trait;
use laurel_core::effects::{PhysicalTimeEffects, TimeError};
use laurel_core::PhysicalTime;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Wall clock that only moves when told to.
///
/// `physical_time` reads the hand-set value. `sleep_ms` waits on the tokio
/// timer, so under `#[tokio::test(start_paused = true)]` sleeps are driven
/// with `tokio::time::advance`; use [`ControllableClock::advance`] alongside
/// it when both clocks must agree.
#[derive(Debug, Clone)]
pub struct ControllableClock {
    current_ms: Arc<Mutex<u64>>,
}

impl ControllableClock {
    /// Create a clock starting at `initial_ms`.
    pub fn new(initial_ms: u64) -> Self {
        Self {
            current_ms: Arc::new(Mutex::new(initial_ms)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.current_ms.lock() += by.as_millis() as u64;
    }

    /// Set the absolute time.
    pub fn set_ms(&self, ms: u64) {
        *self.current_ms.lock() = ms;
    }

    /// Current value in milliseconds.
    pub fn now_ms(&self) -> u64 {
        *self.current_ms.lock()
    }
}

impl Default for ControllableClock {
    /// 2024-01-01T00:00:00Z
    fn default() -> Self {
        Self::new(1_704_067_200_000)
    }
}

#[async_trait]
impl PhysicalTimeEffects for ControllableClock {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        Ok(PhysicalTime::from_ms(self.now_ms()))
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }
}
