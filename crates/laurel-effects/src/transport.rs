//! Layer 3: HTTP transport
//!
//! `RemoteTransport` over reqwest. The handler only moves bytes: any response
//! that arrives is returned as `Ok` with its status, and status/envelope
//! interpretation happens in `laurel-app`.

use std::time::Duration;

use async_trait::async_trait;
use laurel_core::effects::RemoteTransport;
use laurel_core::{ApiConfig, ApiRequest, ApiResponse, HttpMethod, LaurelError, RequestError};

/// reqwest-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the given per-request timeout.
    pub fn new(timeout: Duration) -> Result<Self, LaurelError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LaurelError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Build a transport from the API section of the client configuration.
    pub fn from_config(api: &ApiConfig) -> Result<Self, LaurelError> {
        Self::new(Duration::from_millis(api.request_timeout_ms))
    }
}

#[async_trait]
impl RemoteTransport for HttpTransport {
    async fn send(&self, base_url: &str, request: ApiRequest) -> Result<ApiResponse, RequestError> {
        let url = join_url(base_url, &request.path);
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self
            .client
            .request(method, &url)
            .header(reqwest::header::ACCEPT, "application/json");
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        tracing::debug!(method = request.method.as_str(), url = %url, "sending request");
        let response = builder
            .send()
            .await
            .map_err(|e| RequestError::from_error(&e))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RequestError::from_error(&e).with_status(status))?;
        tracing::debug!(status, url = %url, "response received");

        Ok(ApiResponse::new(status, body))
    }
}

/// Join a base URL and an endpoint path with exactly one `/` between them.
pub fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
