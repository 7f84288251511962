//! Laurel Core
//!
//! Layer 1 of the Laurel client: pure type and trait definitions shared by
//! every other crate.
//!
//! - [`errors`]: the unified [`LaurelError`] type
//! - [`effects`]: traits describing **what** side effects the client performs
//!   (time, secure storage, app lifecycle, remote transport); handlers in
//!   `laurel-effects` define **how**
//! - [`wire`]: the response envelope and the normalized [`RequestError`]
//! - [`config`]: client configuration (base URL, endpoints, timeouts)
//!
//! This crate contains no runtime handlers and no mocks.

pub mod config;
pub mod effects;
pub mod errors;
pub mod time;
pub mod wire;

pub use config::{ApiConfig, CacheConfig, ClientConfig, ConfigError, EndpointPaths, SessionConfig};
pub use errors::{LaurelError, Result};
pub use time::PhysicalTime;
pub use wire::{ApiEnvelope, ApiRequest, ApiResponse, HttpMethod, RequestError, ResponseBody};
