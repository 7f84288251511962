//! Laurel Testkit
//!
//! Layer 8: deterministic doubles for every effect trait in `laurel-core`.
//!
//! - [`ControllableClock`]: wall clock moved by hand; sleeping follows the
//!   tokio clock so `start_paused` tests can drive timers
//! - [`MockSecureStorage`]: in-memory slots with failure injection and call counters
//! - [`MockTransport`]: routed canned responses with optional latency and a request log
//!
//! Lifecycle transitions need no double: tests drive `LifecycleSignal` from
//! `laurel-effects` directly or call the manager's transition handler.

#![allow(clippy::unwrap_used, clippy::expect_used)]

pub mod secure;
pub mod time;
pub mod transport;

pub use secure::MockSecureStorage;
pub use time::ControllableClock;
pub use transport::MockTransport;
