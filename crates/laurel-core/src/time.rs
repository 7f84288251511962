//! Physical time value type.

use serde::{Deserialize, Serialize};

/// Wall-clock timestamp in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhysicalTime {
    /// Milliseconds since the Unix epoch
    pub ts_ms: u64,
}

impl PhysicalTime {
    /// Create a timestamp from milliseconds since the epoch.
    #[must_use]
    pub const fn from_ms(ts_ms: u64) -> Self {
        Self { ts_ms }
    }

    /// Milliseconds elapsed since `earlier`, saturating at zero when the
    /// clock moved backwards.
    #[must_use]
    pub fn millis_since(self, earlier: PhysicalTime) -> u64 {
        self.ts_ms.saturating_sub(earlier.ts_ms)
    }
}
