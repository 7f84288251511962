//! Remote transport effect trait.

use async_trait::async_trait;

use crate::wire::{ApiRequest, ApiResponse, RequestError};

/// Sends a request to the remote service.
///
/// Implementations return `Ok` for every response that arrived, whatever its
/// status; only transport failures (connection refused, timeout, TLS) are
/// `Err`. Status interpretation belongs to the caller.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Send `request` to `base_url` joined with the request path.
    async fn send(&self, base_url: &str, request: ApiRequest) -> Result<ApiResponse, RequestError>;
}

/// Blanket implementation for Arc<T> where T: RemoteTransport
#[async_trait]
impl<T: RemoteTransport + ?Sized> RemoteTransport for std::sync::Arc<T> {
    async fn send(&self, base_url: &str, request: ApiRequest) -> Result<ApiResponse, RequestError> {
        (**self).send(base_url, request).await
    }
}
