//! Domain services.
//!
//! Payloads beyond what the session layer needs stay opaque JSON.

use async_trait::async_trait;
use laurel_core::RequestError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ApiClient;
use crate::credentials::StoredAuthData;
use crate::session::{ProfileSource, UserProfile};

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthPayload {
    token: String,
    #[serde(default)]
    token_type: Option<String>,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthUser {
    user_key: String,
    username: String,
    email: String,
}

impl From<AuthPayload> for StoredAuthData {
    fn from(payload: AuthPayload) -> Self {
        Self {
            token: payload.token,
            token_type: payload
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TOKEN_TYPE.to_string()),
            user_key: payload.user.user_key,
            username: payload.user.username,
            email: payload.user.email,
        }
    }
}

/// Sign-in and registration. Returns the credential bundle to hand to
/// [`AuthSessionContext::set_auth_data`](crate::AuthSessionContext::set_auth_data).
#[derive(Debug, Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn sign_in(&self, request: &LoginRequest) -> Result<StoredAuthData, RequestError> {
        let path = self.api.endpoints().login.clone();
        let payload: AuthPayload = self.api.post(&path, request).await?;
        Ok(payload.into())
    }

    pub async fn register(
        &self,
        request: &RegisterRequest,
    ) -> Result<StoredAuthData, RequestError> {
        let path = self.api.endpoints().register.clone();
        let payload: AuthPayload = self.api.post(&path, request).await?;
        Ok(payload.into())
    }
}

// ============================================================================
// User
// ============================================================================

#[derive(Debug, Clone)]
pub struct UserService {
    api: ApiClient,
}

impl UserService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn profile(&self) -> Result<UserProfile, RequestError> {
        let path = self.api.endpoints().profile.clone();
        self.api.get(&path).await
    }

    /// Update profile fields; returns the stored profile.
    pub async fn update_profile(&self, changes: &Value) -> Result<UserProfile, RequestError> {
        let path = self.api.endpoints().profile.clone();
        self.api.put(&path, changes).await
    }
}

#[async_trait]
impl ProfileSource for UserService {
    async fn fetch_profile(&self) -> Result<UserProfile, RequestError> {
        self.profile().await
    }
}

// ============================================================================
// Achievements
// ============================================================================

#[derive(Debug, Clone)]
pub struct AchievementService {
    api: ApiClient,
}

impl AchievementService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub async fn list(&self) -> Result<Vec<Value>, RequestError> {
        let path = self.api.endpoints().achievements.clone();
        self.api.get(&path).await
    }

    pub async fn get(&self, id: &str) -> Result<Value, RequestError> {
        let path = format!("{}/{id}", self.api.endpoints().achievements);
        self.api.get(&path).await
    }

    pub async fn create(&self, achievement: &Value) -> Result<Value, RequestError> {
        let path = self.api.endpoints().achievements.clone();
        self.api.post(&path, achievement).await
    }

    pub async fn delete(&self, id: &str) -> Result<(), RequestError> {
        let path = format!("{}/{id}", self.api.endpoints().achievements);
        self.api.delete(&path).await
    }

    pub async fn skills(&self) -> Result<Vec<Value>, RequestError> {
        let path = self.api.endpoints().skills.clone();
        self.api.get(&path).await
    }
}
