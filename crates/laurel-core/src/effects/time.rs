//! Physical time effect trait.
//!
//! # Effect Classification
//!
//! - **Category**: Infrastructure Effect
//! - **Implementation**: `laurel-effects` (Layer 3), `laurel-testkit` (Layer 8)
//! - **Usage**: cache freshness checks and the background-session deadline

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::time::PhysicalTime;

/// Error type for time operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum TimeError {
    /// The wall clock could not be read (for example, set before 1970)
    #[error("Clock unavailable: {reason}")]
    ClockUnavailable {
        /// Platform clock failure
        reason: String,
    },
}

/// Wall-clock time and sleeping.
#[async_trait]
pub trait PhysicalTimeEffects: Send + Sync {
    /// Current wall-clock time.
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError>;

    /// Suspend the caller for `ms` milliseconds.
    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError>;
}

/// Blanket implementation for Arc<T> where T: PhysicalTimeEffects
#[async_trait]
impl<T: PhysicalTimeEffects + ?Sized> PhysicalTimeEffects for std::sync::Arc<T> {
    async fn physical_time(&self) -> Result<PhysicalTime, TimeError> {
        (**self).physical_time().await
    }

    async fn sleep_ms(&self, ms: u64) -> Result<(), TimeError> {
        (**self).sleep_ms(ms).await
    }
}
