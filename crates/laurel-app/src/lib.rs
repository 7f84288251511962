//! Laurel App
//!
//! Layer 4 of the Laurel client: the portable data/session core shared by
//! every platform shell.
//!
//! This crate handles everything between a tap and the server:
//! - validating form input ([`validation`], [`form`])
//! - running remote calls once, with caching ([`request`], [`api`])
//! - holding and persisting the signed-in session ([`credentials`],
//!   [`session`]) and revoking it after prolonged backgrounding
//!   ([`lifecycle`])
//!
//! Side effects come in through the `laurel-core` effect traits; nothing in
//! this crate touches the network, disk or clock directly.

#![allow(missing_docs)]

pub mod api;
pub mod client;
pub mod credentials;
pub mod form;
pub mod lifecycle;
pub mod request;
pub mod session;
pub mod validation;

pub use api::{
    AchievementService, ApiClient, AuthService, LoginRequest, RegisterRequest, UserService,
};
pub use client::{ClientEffects, LaurelClient};
pub use credentials::{SecureCredentialStore, StoredAuthData, UserSummary};
pub use form::{FormConfig, FormController, FormState, SubmitOutcome};
pub use lifecycle::{LifecycleConfig, LifecyclePhase, SessionLifecycleManager};
pub use request::{CachedResult, RequestCoordinator};
pub use session::{AuthSessionContext, ProfileSource, SessionState, UserProfile};
pub use validation::{
    validate_field, validate_form, FieldRule, FieldValidation, FormValidation, Record, RuleSet,
};

/// Errors from flows that span the network and the credential store.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server call failed.
    #[error(transparent)]
    Request(#[from] laurel_core::RequestError),

    /// The call succeeded but its outcome could not be applied locally.
    #[error(transparent)]
    Local(#[from] laurel_core::LaurelError),
}
