use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Environment override for [`ApiConfig::base_url`]
pub const ENV_API_BASE_URL: &str = "LAUREL_API_BASE_URL";
/// Environment override for [`SessionConfig::background_timeout_secs`]
pub const ENV_SESSION_TIMEOUT_SECS: &str = "LAUREL_SESSION_TIMEOUT_SECS";
/// Environment override for [`CacheConfig::ttl_secs`]
pub const ENV_CACHE_TTL_SECS: &str = "LAUREL_CACHE_TTL_SECS";

/// Default response cache lifetime (5 minutes).
const DEFAULT_CACHE_TTL_SECS: u64 = 5 * 60;
/// Default time the app may stay backgrounded before the session expires (5 minutes).
const DEFAULT_BACKGROUND_TIMEOUT_SECS: u64 = 5 * 60;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Top-level client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Remote service settings
    pub api: ApiConfig,
    /// Response cache settings
    pub cache: CacheConfig,
    /// Session lifetime settings
    pub session: SessionConfig,
}

/// Remote service location and endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every endpoint path is joined to
    pub base_url: String,
    /// Per-request timeout
    pub request_timeout_ms: u64,
    /// Fixed endpoint paths
    pub endpoints: EndpointPaths,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            endpoints: EndpointPaths::default(),
        }
    }
}

/// Endpoint paths relative to the base URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPaths {
    /// `POST` sign-in
    pub login: String,
    /// `POST` account creation
    pub register: String,
    /// `GET` signed-in user's profile
    pub profile: String,
    /// `GET` achievement list
    pub achievements: String,
    /// `GET` skill list
    pub skills: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            register: "/auth/register".to_string(),
            profile: "/users/profile".to_string(),
            achievements: "/achievements".to_string(),
            skills: "/skills".to_string(),
        }
    }
}

impl EndpointPaths {
    fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("api.endpoints.login", &self.login),
            ("api.endpoints.register", &self.register),
            ("api.endpoints.profile", &self.profile),
            ("api.endpoints.achievements", &self.achievements),
            ("api.endpoints.skills", &self.skills),
        ]
    }
}

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Lifetime of a cached response
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl CacheConfig {
    /// TTL as a duration.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Session lifetime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long the app may stay in the background before the session expires
    pub background_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            background_timeout_secs: DEFAULT_BACKGROUND_TIMEOUT_SECS,
        }
    }
}

impl SessionConfig {
    /// Background timeout as a duration.
    #[must_use]
    pub fn background_timeout(&self) -> Duration {
        Duration::from_secs(self.background_timeout_secs)
    }
}

impl ClientConfig {
    /// Parse a TOML document. Missing sections and fields take defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults, then the optional file, then the process environment, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `LAUREL_*` overrides from the process environment.
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_with_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn merge_with_vars<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(ENV_API_BASE_URL) {
            tracing::debug!(base_url = %base_url, "api base url overridden from environment");
            self.api.base_url = base_url;
        }
        if let Some(raw) = lookup(ENV_SESSION_TIMEOUT_SECS) {
            self.session.background_timeout_secs = parse_secs(ENV_SESSION_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CACHE_TTL_SECS) {
            self.cache.ttl_secs = parse_secs(ENV_CACHE_TTL_SECS, &raw)?;
        }
        Ok(())
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.api.base_url)
            .map_err(|e| ConfigError::invalid("api.base_url", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "api.base_url",
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if self.api.request_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "api.request_timeout_ms",
                "must be greater than 0",
            ));
        }
        for (field, path) in self.api.endpoints.entries() {
            if !path.starts_with('/') {
                return Err(ConfigError::invalid(field, "must start with '/'"));
            }
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::invalid("cache.ttl_secs", "must be greater than 0"));
        }
        if self.session.background_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "session.background_timeout_secs",
                "must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn parse_secs(var: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|e| ConfigError::Env {
        var: var.to_string(),
        reason: e.to_string(),
    })
}
