//! Layer 3: Time Effect Handler - Production Only
//!
//! Stateless implementation of `PhysicalTimeEffects` delegating to the system
//! clock and the tokio timer.

use async_trait::async_trait;
use laurel_core::effects::{PhysicalTimeEffects, TimeError};
use laurel_core::PhysicalTime;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Real time handler for production use
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeHandler;

impl RealTimeHandler {
    /// Create a new real time handler
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PhysicalTimeEffects for RealTimeHandler {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| TimeError::ClockUnavailable {
                reason: e.to_string(),
            })?;
        Ok(PhysicalTime::from_ms(elapsed.as_millis() as u64))
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }
}
