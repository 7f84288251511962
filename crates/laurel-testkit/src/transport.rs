//! Routed mock transport

use async_trait::async_trait;
use laurel_core::effects::RemoteTransport;
use laurel_core::{ApiRequest, ApiResponse, HttpMethod, RequestError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

type Route = (HttpMethod, String);

/// Transport answering from a routing table.
///
/// Unrouted requests get a 404 with a JSON error body. Every request is
/// logged, including its headers, so tests can assert on the bearer header.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    routes: Mutex<HashMap<Route, Result<ApiResponse, RequestError>>>,
    latency: Mutex<Option<Duration>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    /// Transport with no routes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method path` with `status` and `body`.
    pub fn respond(&self, method: HttpMethod, path: &str, status: u16, body: serde_json::Value) {
        self.inner.routes.lock().insert(
            (method, path.to_string()),
            Ok(ApiResponse::new(status, body.to_string())),
        );
    }

    /// Answer `method path` with a raw (possibly non-JSON) body.
    pub fn respond_raw(&self, method: HttpMethod, path: &str, status: u16, body: &str) {
        self.inner.routes.lock().insert(
            (method, path.to_string()),
            Ok(ApiResponse::new(status, body)),
        );
    }

    /// Fail `method path` at the transport level (no response).
    pub fn fail(&self, method: HttpMethod, path: &str, message: &str) {
        self.inner
            .routes
            .lock()
            .insert((method, path.to_string()), Err(RequestError::new(message)));
    }

    /// Delay every response by `latency` (tokio clock).
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = Some(latency);
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.inner.log.lock().clone()
    }

    /// Number of requests received for `method path`.
    pub fn call_count(&self, method: HttpMethod, path: &str) -> usize {
        self.inner
            .log
            .lock()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn send(
        &self,
        _base_url: &str,
        request: ApiRequest,
    ) -> Result<ApiResponse, RequestError> {
        let route = (request.method, request.path.clone());
        self.inner.log.lock().push(request);

        let latency = *self.inner.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let answer = self.inner.routes.lock().get(&route).cloned();
        answer.unwrap_or_else(|| {
            Ok(ApiResponse::new(
                404,
                serde_json::json!({"success": false, "message": "Not found"}).to_string(),
            ))
        })
    }
}
