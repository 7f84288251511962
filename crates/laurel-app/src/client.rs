//! Composition root.
//!
//! [`LaurelClient`] is built once at process start from the configuration
//! and the platform's effect handlers, and handed by reference to whatever
//! needs it. It owns the single [`AuthSessionContext`].

use std::sync::Arc;

use laurel_core::effects::{
    AppLifecycleEffects, PhysicalTimeEffects, RemoteTransport, SecureStorageEffects,
};
use laurel_core::{ClientConfig, LaurelError};

use crate::api::{
    AchievementService, ApiClient, AuthService, LoginRequest, RegisterRequest, UserService,
};
use crate::credentials::SecureCredentialStore;
use crate::lifecycle::LifecycleConfig;
use crate::request::RequestCoordinator;
use crate::session::AuthSessionContext;
use crate::ClientError;

/// Platform handlers the client is built from.
#[derive(Clone)]
pub struct ClientEffects {
    pub transport: Arc<dyn RemoteTransport>,
    pub secure_storage: Arc<dyn SecureStorageEffects>,
    pub time: Arc<dyn PhysicalTimeEffects>,
    /// Source of foreground/background transitions, if the platform has one.
    pub lifecycle: Option<Arc<dyn AppLifecycleEffects>>,
}

#[derive(Clone)]
pub struct LaurelClient {
    config: ClientConfig,
    time: Arc<dyn PhysicalTimeEffects>,
    credentials: SecureCredentialStore,
    api: ApiClient,
    session: AuthSessionContext,
}

impl std::fmt::Debug for LaurelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaurelClient")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl LaurelClient {
    /// Validate `config` and wire every component.
    pub fn new(config: ClientConfig, effects: ClientEffects) -> Result<Self, LaurelError> {
        config.validate()?;

        let credentials = SecureCredentialStore::new(effects.secure_storage);
        let api = ApiClient::new(effects.transport, credentials.clone(), config.api.clone());
        let session = AuthSessionContext::new(
            credentials.clone(),
            Arc::new(UserService::new(api.clone())),
            Arc::clone(&effects.time),
            effects.lifecycle,
            LifecycleConfig::from(&config.session),
        );

        tracing::debug!(base_url = %config.api.base_url, "Laurel client ready");
        Ok(Self {
            config,
            time: effects.time,
            credentials,
            api,
            session,
        })
    }

    // ========================================================================
    // Session flows
    // ========================================================================

    /// Restore a persisted session, if any.
    pub async fn restore_session(&self) -> bool {
        self.session.check_auth_status().await
    }

    pub async fn sign_in(&self, request: &LoginRequest) -> Result<(), ClientError> {
        let data = self.auth().sign_in(request).await?;
        self.session.set_auth_data(data).await?;
        Ok(())
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<(), ClientError> {
        let data = self.auth().register(request).await?;
        self.session.set_auth_data(data).await?;
        Ok(())
    }

    pub async fn sign_out(&self) -> Result<(), LaurelError> {
        self.session.clear_auth().await
    }

    // ========================================================================
    // Components
    // ========================================================================

    /// A coordinator using the configured cache TTL. Each feature should own
    /// its own so cache keys never collide across features.
    #[must_use]
    pub fn request_coordinator<T>(&self) -> RequestCoordinator<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        RequestCoordinator::new(Arc::clone(&self.time)).with_ttl(self.config.cache.ttl())
    }

    #[must_use]
    pub fn session(&self) -> &AuthSessionContext {
        &self.session
    }

    #[must_use]
    pub fn credentials(&self) -> &SecureCredentialStore {
        &self.credentials
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn auth(&self) -> AuthService {
        AuthService::new(self.api.clone())
    }

    #[must_use]
    pub fn users(&self) -> UserService {
        UserService::new(self.api.clone())
    }

    #[must_use]
    pub fn achievements(&self) -> AchievementService {
        AchievementService::new(self.api.clone())
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use laurel_core::HttpMethod;
    use laurel_testkit::{ControllableClock, MockSecureStorage, MockTransport};
    use serde_json::json;

    fn effects(transport: &MockTransport, storage: &MockSecureStorage) -> ClientEffects {
        ClientEffects {
            transport: Arc::new(transport.clone()),
            secure_storage: Arc::new(storage.clone()),
            time: Arc::new(ControllableClock::default()),
            lifecycle: None,
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = ClientConfig::default();
        config.api.base_url = "not a url".into();
        let deps = effects(&MockTransport::new(), &MockSecureStorage::new());
        let result = LaurelClient::new(config, deps);
        assert_matches!(result, Err(LaurelError::Config { .. }));
    }

    #[tokio::test]
    async fn sign_in_persists_and_authenticates() {
        let transport = MockTransport::new();
        transport.respond(
            HttpMethod::Post,
            "/auth/login",
            200,
            json!({
                "success": true,
                "data": {
                    "token": "tok",
                    "tokenType": "Bearer",
                    "user": {"userKey": "u-1", "username": "ada", "email": "ada@example.com"}
                }
            }),
        );
        let storage = MockSecureStorage::new();
        let client =
            LaurelClient::new(ClientConfig::default(), effects(&transport, &storage)).unwrap();

        client
            .sign_in(&LoginRequest {
                email: "ada@example.com".into(),
                password: "pw".into(),
            })
            .await
            .unwrap();
        assert!(client.session().is_authenticated());
        assert_eq!(
            client.credentials().authorization_header_value().await.as_deref(),
            Some("Bearer tok")
        );

        client.sign_out().await.unwrap();
        assert!(!client.session().is_authenticated());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn rejected_sign_in_is_a_request_error() {
        let transport = MockTransport::new();
        transport.respond(
            HttpMethod::Post,
            "/auth/login",
            401,
            json!({"success": false, "message": "Invalid credentials"}),
        );
        let storage = MockSecureStorage::new();
        let client =
            LaurelClient::new(ClientConfig::default(), effects(&transport, &storage)).unwrap();

        let err = client
            .sign_in(&LoginRequest {
                email: "ada@example.com".into(),
                password: "bad".into(),
            })
            .await
            .unwrap_err();
        assert_matches!(err, ClientError::Request(ref e) if e.status_code == Some(401));
        assert!(!client.session().is_authenticated());
        assert_eq!(storage.set_calls(), 0);
    }

    #[test]
    fn coordinators_use_configured_ttl() {
        let mut config = ClientConfig::default();
        config.cache.ttl_secs = 60;
        let deps = effects(&MockTransport::new(), &MockSecureStorage::new());
        let client = LaurelClient::new(config, deps).unwrap();
        assert_eq!(client.request_coordinator::<u32>().ttl().as_secs(), 60);
    }
}
