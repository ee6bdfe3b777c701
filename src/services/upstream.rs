//! Upstream inference API client
//!
//! The dispatcher talks to the upstream through the [`UpstreamTransport`]
//! trait. [`HttpUpstream`] is the production implementation on top of
//! `reqwest`; tests substitute scripted transports.

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use futures::stream::{BoxStream, StreamExt};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

use crate::config::Settings;
use crate::services::backend_pool::Credential;
use crate::services::transformer::UpstreamRequest;
use crate::utils::{with_timeout, TimeoutError};

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while talking to the upstream
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Failed to reach upstream: {0}")]
    Transport(String),

    #[error("Upstream did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Upstream body error: {0}")]
    Body(String),

    #[error("Invalid credential header: {0}")]
    InvalidCredential(String),

    #[error("Upstream body exceeded {0} bytes")]
    TooLarge(usize),
}

// ============================================================================
// Response Types
// ============================================================================

/// Upstream body, consumed lazily
pub type UpstreamBody = BoxStream<'static, Result<Bytes, UpstreamError>>;

/// A response whose headers have arrived but whose body is still unread
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: UpstreamBody) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Build a response from an already buffered body
    pub fn from_bytes(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self::new(
            status,
            HeaderMap::new(),
            futures::stream::once(async move { Ok(body) }).boxed(),
        )
    }

}

/// Read a body to the end
///
/// Fails if no chunk arrives within `idle_timeout`, or once more than
/// `limit` bytes have been received.
pub async fn collect_body(
    mut body: UpstreamBody,
    idle_timeout: Duration,
    limit: usize,
) -> Result<Bytes, UpstreamError> {
    let mut buffer = Vec::new();
    loop {
        match tokio::time::timeout(idle_timeout, body.next()).await {
            Ok(Some(chunk)) => {
                let chunk = chunk?;
                if buffer.len() + chunk.len() > limit {
                    return Err(UpstreamError::TooLarge(limit));
                }
                buffer.extend_from_slice(&chunk);
            }
            Ok(None) => return Ok(Bytes::from(buffer)),
            Err(_) => return Err(UpstreamError::Timeout(idle_timeout)),
        }
    }
}

impl std::fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// One outbound call to the upstream with one credential
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    /// Send `request` authorized by `credential`
    ///
    /// Resolves once response headers are available. Any status is returned
    /// as `Ok`; only failures to obtain a response are errors.
    async fn send(
        &self,
        credential: &Credential,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, UpstreamError>;
}

// ============================================================================
// HTTP Transport
// ============================================================================

/// `reqwest`-backed transport for a single fixed endpoint
#[derive(Clone)]
pub struct HttpUpstream {
    /// HTTP client
    client: Client,

    /// Endpoint every call is posted to
    url: String,

    /// Deadline for response headers on one attempt
    attempt_timeout: Duration,
}

impl HttpUpstream {
    pub fn new(
        url: impl Into<String>,
        connect_timeout: Duration,
        attempt_timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            attempt_timeout,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, UpstreamError> {
        Self::new(
            settings.upstream_url.clone(),
            settings.timeouts.connect_timeout(),
            settings.timeouts.attempt_timeout(),
        )
    }
}

#[async_trait]
impl UpstreamTransport for HttpUpstream {
    async fn send(
        &self,
        credential: &Credential,
        request: &UpstreamRequest,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let authorization = HeaderValue::from_str(&credential.bearer())
            .map_err(|_| UpstreamError::InvalidCredential(credential.name().to_string()))?;

        let mut headers = request.headers.clone();
        headers.insert(header::AUTHORIZATION, authorization);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        tracing::debug!(
            url = %self.url,
            credential = %credential.name(),
            forwarded_headers = request.headers.len(),
            "Calling upstream chat completions"
        );

        let call = self
            .client
            .post(&self.url)
            .headers(headers)
            .body(request.body.clone())
            .send();

        let response = with_timeout(self.attempt_timeout, call)
            .await
            .map_err(|e| match e {
                TimeoutError::Timeout(after) => UpstreamError::Timeout(after),
                TimeoutError::Inner(err) if err.is_timeout() => {
                    UpstreamError::Timeout(self.attempt_timeout)
                }
                TimeoutError::Inner(err) => UpstreamError::Transport(err.to_string()),
            })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| UpstreamError::Body(e.to_string())))
            .boxed();

        Ok(UpstreamResponse::new(status, headers, body))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap as AxumHeaders, routing::post, Json, Router};
    use serde_json::{json, Value};

    /// Echo server that reports what the upstream saw
    async fn spawn_echo_upstream() -> String {
        async fn echo(headers: AxumHeaders, body: Bytes) -> (StatusCode, Json<Value>) {
            let header = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let status = if header("authorization").as_deref() == Some("Bearer bad-key") {
                StatusCode::TOO_MANY_REQUESTS
            } else {
                StatusCode::OK
            };
            (
                status,
                Json(json!({
                    "authorization": header("authorization"),
                    "content_type": header("content-type"),
                    "custom": header("x-custom-header"),
                    "body": serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null),
                })),
            )
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/v1/chat/completions", post(echo));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    fn upstream_request(headers: HeaderMap) -> UpstreamRequest {
        UpstreamRequest {
            body: Bytes::from_static(br#"{"model":"m","messages":[]}"#),
            headers,
            model: Some("m".to_string()),
            stream: false,
        }
    }

    #[tokio::test]
    async fn test_sends_bearer_and_json_content_type() {
        let url = spawn_echo_upstream().await;
        let upstream = HttpUpstream::new(url, Duration::from_secs(5), Duration::from_secs(5)).unwrap();

        let mut forwarded = HeaderMap::new();
        forwarded.insert("x-custom-header", HeaderValue::from_static("kept"));

        let response = upstream
            .send(&Credential::new("good-key", "key_1"), &upstream_request(forwarded))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let body = collect_body(response.body, Duration::from_secs(5), usize::MAX)
            .await
            .unwrap();
        let seen: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(seen["authorization"], "Bearer good-key");
        assert_eq!(seen["content_type"], "application/json");
        assert_eq!(seen["custom"], "kept");
        assert_eq!(seen["body"], json!({"model": "m", "messages": []}));
    }

    #[tokio::test]
    async fn test_error_status_is_returned_not_raised() {
        let url = spawn_echo_upstream().await;
        let upstream = HttpUpstream::new(url, Duration::from_secs(5), Duration::from_secs(5)).unwrap();

        let response = upstream
            .send(&Credential::new("bad-key", "key_1"), &upstream_request(HeaderMap::new()))
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_transport_error() {
        // Bind then drop to obtain a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let upstream = HttpUpstream::new(
            format!("http://{}/v1/chat/completions", addr),
            Duration::from_secs(2),
            Duration::from_secs(2),
        )
        .unwrap();

        let result = upstream
            .send(&Credential::new("k", "key_1"), &upstream_request(HeaderMap::new()))
            .await;
        assert!(matches!(
            result,
            Err(UpstreamError::Transport(_)) | Err(UpstreamError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_collect_body_reads_all_chunks() {
        let body = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"hel")),
            Ok(Bytes::from_static(b"lo")),
        ])
        .boxed();
        let bytes = collect_body(body, Duration::from_secs(1), 16).await.unwrap();
        assert_eq!(bytes, Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_collect_body_enforces_limit() {
        let response = UpstreamResponse::from_bytes(StatusCode::OK, vec![b'x'; 32]);
        let result = collect_body(response.body, Duration::from_secs(1), 16).await;
        assert!(matches!(result, Err(UpstreamError::TooLarge(16))));
    }

    #[tokio::test]
    async fn test_collect_body_times_out_on_stalled_body() {
        let body = futures::stream::iter(vec![Ok(Bytes::from_static(b"{\"err"))])
            .chain(futures::stream::pending())
            .boxed();
        let result = collect_body(body, Duration::from_millis(20), 1024).await;
        assert!(matches!(result, Err(UpstreamError::Timeout(_))));
    }
}
