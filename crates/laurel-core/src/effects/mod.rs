//! Layer 1: Core Effect Trait Definitions
//!
//! Pure trait definitions for all side-effect operations in the Laurel client.
//! This module defines **what** effects can be performed; handlers define **how**.
//!
//! ## Infrastructure Effects (Layer 3: `laurel-effects`)
//! - **Time**: wall-clock timestamps for cache freshness, sleeping for the
//!   background deadline
//! - **Secure storage**: string slots in the platform keychain/keystore
//! - **App lifecycle**: foreground/background transitions from the platform
//! - **Transport**: sending requests to the remote service
//!
//! ## Testing Effects (Layer 8: `laurel-testkit`)
//! Deterministic doubles for every trait above.
//!
//! All effect-using code in `laurel-app` is parameterized by these traits so
//! it can run against real handlers or test doubles unchanged.

pub mod lifecycle;
pub mod secure;
pub mod time;
pub mod transport;

pub use lifecycle::{AppLifecycleEffects, AppState};
pub use secure::{SecureStorageEffects, SecureStorageError};
pub use time::{PhysicalTimeEffects, TimeError};
pub use transport::RemoteTransport;
