//! Remote API access.
//!
//! [`ApiClient`] composes a [`RemoteTransport`] with the configured base URL,
//! the bearer header from the credential store, and envelope decoding. The
//! domain services in [`services`] are thin typed wrappers over it.

pub mod services;

use std::sync::Arc;

use laurel_core::effects::RemoteTransport;
use laurel_core::{ApiConfig, ApiRequest, ApiResponse, EndpointPaths, RequestError};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::credentials::SecureCredentialStore;

pub use services::{
    AchievementService, AuthService, LoginRequest, RegisterRequest, UserService,
};

const AUTHORIZATION: &str = "Authorization";

/// Authenticated, envelope-aware API client.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn RemoteTransport>,
    credentials: SecureCredentialStore,
    config: ApiConfig,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.config.base_url)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        credentials: SecureCredentialStore,
        config: ApiConfig,
    ) -> Self {
        Self {
            transport,
            credentials,
            config,
        }
    }

    #[must_use]
    pub fn endpoints(&self) -> &EndpointPaths {
        &self.config.endpoints
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Send `request` and unwrap the envelope's payload.
    ///
    /// The stored bearer header is attached unless the request already
    /// carries an `Authorization` header.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, RequestError> {
        let response = self.dispatch(request).await?;
        response.decode()
    }

    /// Like [`send`](Self::send), for endpoints whose envelope may carry no
    /// payload.
    pub async fn send_optional<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<Option<T>, RequestError> {
        let response = self.dispatch(request).await?;
        response.decode_optional()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        self.send(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RequestError> {
        self.send(ApiRequest::post(path, serde_json::to_value(body)?))
            .await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RequestError> {
        self.send(ApiRequest::put(path, serde_json::to_value(body)?))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<(), RequestError> {
        self.send_optional::<serde_json::Value>(ApiRequest::delete(path))
            .await
            .map(|_| ())
    }

    async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse, RequestError> {
        if request.header(AUTHORIZATION).is_none() {
            if let Some(value) = self.credentials.authorization_header_value().await {
                request = request.with_header(AUTHORIZATION, value);
            }
        }

        let method = request.method.as_str();
        let path = request.path.clone();
        let result = self.transport.send(&self.config.base_url, request).await;
        match &result {
            Ok(response) => {
                tracing::debug!(method, path = %path, status = response.status, "API response");
            }
            Err(err) => {
                tracing::debug!(method, path = %path, error = %err, "API transport failure");
            }
        }
        result
    }
}
