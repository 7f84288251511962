//! Laurel Effects
//!
//! Layer 3: production handlers for the effect traits defined in
//! `laurel-core`. Handlers here are stateless or own only platform state
//! (files, sockets, a broadcast channel); no application semantics live here.
//!
//! **Layer Constraint**: NO mock handlers - those belong in `laurel-testkit`.

pub mod lifecycle;
pub mod secure;
pub mod time;
pub mod tracing_init;
pub mod transport;

pub use lifecycle::LifecycleSignal;
pub use secure::{EncryptedFileSecureStorage, SecureStorageKey};
pub use time::RealTimeHandler;
pub use tracing_init::init_tracing;
pub use transport::HttpTransport;
