//! Wire types shared between the transport and the request layer
//!
//! Every remote service answers with the same envelope,
//! `{ "success": bool, "data"?: T, "message"?: string }`, and every failure,
//! whatever its origin, is normalized into a single [`RequestError`] shape:
//!
//! - a transport failure (no response at all): message only
//! - a non-2xx response: status code plus the body, parsed as JSON when
//!   possible and kept as raw text otherwise
//! - a 2xx response whose body does not parse: status plus the raw text
//! - an envelope with `success: false`: its message, status and parsed body

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

// ============================================================================
// Normalized request error
// ============================================================================

/// Body of a failed response, kept in whichever form it could be read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseBody {
    /// Body parsed as JSON
    Json(serde_json::Value),
    /// Body that was not valid JSON, kept verbatim
    Text(String),
}

impl ResponseBody {
    /// Parse a raw body, falling back to plain text.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value) => Self::Json(value),
            Err(_) => Self::Text(raw.to_string()),
        }
    }

    /// Server-provided message, if the body is JSON carrying one.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Json(value) => value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(serde_json::Value::as_str),
            Self::Text(_) => None,
        }
    }
}

/// The single error shape for every remote operation failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct RequestError {
    /// Human-readable message
    pub message: String,
    /// HTTP status, when a response arrived
    pub status_code: Option<u16>,
    /// Response body, when a response with a body arrived
    pub response_body: Option<ResponseBody>,
}

impl RequestError {
    /// Error with a message only (thrown exception, transport failure).
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code: None,
            response_body: None,
        }
    }

    /// Normalize any error value into a request error.
    pub fn from_error<E: std::error::Error + ?Sized>(err: &E) -> Self {
        Self::new(err.to_string())
    }

    /// Normalize a non-2xx response.
    ///
    /// The message comes from the body's `message` (or `error`) field when the
    /// body is JSON carrying one, otherwise a generic status message.
    #[must_use]
    pub fn from_response(status: u16, raw_body: &str) -> Self {
        let body = ResponseBody::parse(raw_body);
        let message = body
            .message()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Request failed with status {status}"));
        Self {
            message,
            status_code: Some(status),
            response_body: Some(body),
        }
    }

    /// Attach a status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    /// Attach a response body.
    #[must_use]
    pub fn with_body(mut self, body: ResponseBody) -> Self {
        self.response_body = Some(body);
        self
    }

    /// Whether the server rejected the caller's credentials.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status_code == Some(401)
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        Self::from_error(&err)
    }
}

// ============================================================================
// Response envelope
// ============================================================================

/// The service-wide response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    /// Whether the operation succeeded
    pub success: bool,
    /// Payload on success
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    /// Server message (usually present on failure)
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Successful envelope carrying `data`.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    /// Failed envelope carrying `message`.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Unwrap the payload; a failed envelope or a missing payload is an error.
    pub fn into_result(self) -> Result<T, RequestError> {
        match self.into_data()? {
            Some(data) => Ok(data),
            None => Err(RequestError::new("Response envelope carried no data")),
        }
    }

    /// Unwrap an optional payload; only a failed envelope is an error.
    pub fn into_data(self) -> Result<Option<T>, RequestError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(RequestError::new(
                self.message
                    .unwrap_or_else(|| "Request was not successful".to_string()),
            ))
        }
    }
}

// ============================================================================
// Transport request/response
// ============================================================================

/// HTTP method subset the client uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    /// Canonical upper-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

/// A request handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    /// HTTP method
    pub method: HttpMethod,
    /// Path relative to the configured base URL (leading `/`)
    pub path: String,
    /// Extra headers
    pub headers: Vec<(String, String)>,
    /// JSON body
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    /// Create a request without body.
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// GET request.
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, path)
    }

    /// POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Post, path).with_body(body)
    }

    /// PUT request with a JSON body.
    pub fn put(path: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(HttpMethod::Put, path).with_body(body)
    }

    /// DELETE request.
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(HttpMethod::Delete, path)
    }

    /// Attach a JSON body.
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Look up a header (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A response as received by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Raw body text
    pub body: String,
}

impl ApiResponse {
    /// Create a response.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the envelope and unwrap its payload, normalizing every failure.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, RequestError> {
        self.decode_envelope::<T>()?
            .into_result()
            .map_err(|err| self.annotate(err))
    }

    /// Decode the envelope and unwrap an optional payload.
    pub fn decode_optional<T: DeserializeOwned>(&self) -> Result<Option<T>, RequestError> {
        self.decode_envelope::<T>()?
            .into_data()
            .map_err(|err| self.annotate(err))
    }

    fn decode_envelope<T: DeserializeOwned>(&self) -> Result<ApiEnvelope<T>, RequestError> {
        if !self.is_success() {
            return Err(RequestError::from_response(self.status, &self.body));
        }
        serde_json::from_str::<ApiEnvelope<T>>(&self.body).map_err(|err| {
            RequestError::new(format!("Unparseable response body: {err}"))
                .with_status(self.status)
                .with_body(ResponseBody::parse(&self.body))
        })
    }

    fn annotate(&self, err: RequestError) -> RequestError {
        err.with_status(self.status)
            .with_body(ResponseBody::parse(&self.body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_2xx_json_body_uses_server_message() {
        let err = RequestError::from_response(422, r#"{"message":"Email already taken"}"#);
        assert_eq!(err.message, "Email already taken");
        assert_eq!(err.status_code, Some(422));
        assert_eq!(
            err.response_body,
            Some(ResponseBody::Json(json!({"message": "Email already taken"})))
        );
    }

    #[test]
    fn non_2xx_text_body_is_kept_verbatim() {
        let err = RequestError::from_response(502, "<html>Bad Gateway</html>");
        assert_eq!(err.message, "Request failed with status 502");
        assert_eq!(
            err.response_body,
            Some(ResponseBody::Text("<html>Bad Gateway</html>".to_string()))
        );
    }

    #[test]
    fn plain_error_has_no_status() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "timeout");
        let err = RequestError::from_error(&io);
        assert_eq!(err.message, "timeout");
        assert_eq!(err.status_code, None);
        assert_eq!(err.response_body, None);
    }

    #[test]
    fn decode_unwraps_successful_envelope() {
        let resp = ApiResponse::new(200, r#"{"success":true,"data":{"id":7}}"#);
        let value: serde_json::Value = resp.decode().unwrap();
        assert_eq!(value, json!({"id": 7}));
    }

    #[test]
    fn decode_failed_envelope_keeps_status_and_body() {
        let resp = ApiResponse::new(200, r#"{"success":false,"message":"Skill not found"}"#);
        let err = resp.decode::<serde_json::Value>().unwrap_err();
        assert_eq!(err.message, "Skill not found");
        assert_eq!(err.status_code, Some(200));
        assert!(matches!(err.response_body, Some(ResponseBody::Json(_))));
    }

    #[test]
    fn decode_unparseable_success_body_keeps_raw_text() {
        let resp = ApiResponse::new(200, "OK");
        let err = resp.decode::<serde_json::Value>().unwrap_err();
        assert!(err.message.starts_with("Unparseable response body"));
        assert_eq!(err.response_body, Some(ResponseBody::Text("OK".to_string())));
    }

    #[test]
    fn decode_payload_without_default_impl() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Badge {
            id: u32,
        }

        let resp = ApiResponse::new(200, r#"{"success":true,"data":{"id":3}}"#);
        assert_eq!(resp.decode::<Badge>().unwrap(), Badge { id: 3 });

        let empty = ApiResponse::new(200, r#"{"success":true}"#);
        assert!(empty.decode_optional::<Badge>().unwrap().is_none());
        assert_eq!(
            empty.decode::<Badge>().unwrap_err().message,
            "Response envelope carried no data"
        );
    }

    #[test]
    fn decode_optional_allows_missing_data() {
        let resp = ApiResponse::new(204, r#"{"success":true}"#);
        let data: Option<serde_json::Value> = resp.decode_optional().unwrap();
        assert!(data.is_none());
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let req = ApiRequest::get("/users/me").with_header("Authorization", "Bearer abc");
        assert_eq!(req.header("authorization"), Some("Bearer abc"));
    }
}
