//! Relay of successful upstream responses to the caller
//!
//! Buffered replies are parsed and re-serialized unchanged. Streamed replies
//! are forwarded chunk by chunk as they arrive; the outgoing body only pulls
//! from the upstream when the caller is ready for more, so a slow reader
//! never causes unbounded buffering.

use axum::{
    body::{Body, Bytes},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use std::io;
use std::time::{Duration, Instant};

use crate::error::ApiError;
use crate::services::upstream::{collect_body, UpstreamBody, UpstreamError, UpstreamResponse};

// ============================================================================
// UTF-8 Re-chunking
// ============================================================================

/// Length of the prefix of `data` that does not end inside a partially
/// received UTF-8 sequence.
///
/// Only the last three bytes are inspected. Bytes that are not valid UTF-8
/// are treated as complete so they pass through unchanged.
fn complete_prefix_len(data: &[u8]) -> usize {
    let len = data.len();
    for back in 1..=len.min(3) {
        let byte = data[len - back];
        if byte & 0xC0 == 0x80 {
            // Continuation byte, keep looking for the lead byte
            continue;
        }
        let width = match byte {
            0xC0..=0xDF => 2,
            0xE0..=0xEF => 3,
            0xF0..=0xF7 => 4,
            _ => 1,
        };
        return if width > back { len - back } else { len };
    }
    len
}

/// Incremental decoder that realigns chunks on character boundaries
///
/// A multi-byte character split across upstream chunks is held back and
/// emitted whole with the next chunk. Concatenated output always equals
/// concatenated input.
#[derive(Debug, Default)]
pub struct Utf8Rechunker {
    pending: Vec<u8>,
}

impl Utf8Rechunker {
    /// Feed one upstream chunk, returning the bytes that can go out now
    pub fn push(&mut self, chunk: Bytes) -> Bytes {
        let data = if self.pending.is_empty() {
            chunk
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(&chunk);
            Bytes::from(joined)
        };

        let cut = complete_prefix_len(&data);
        if cut < data.len() {
            self.pending.extend_from_slice(&data[cut..]);
        }
        data.slice(..cut)
    }

    /// Flush whatever is still held back at end of stream
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.pending.is_empty() {
            None
        } else {
            Some(Bytes::from(std::mem::take(&mut self.pending)))
        }
    }
}

// ============================================================================
// Relay
// ============================================================================

/// How replies are relayed
#[derive(Debug, Clone, Copy)]
pub struct RelayOptions {
    /// Maximum wait for the next upstream chunk
    pub idle_timeout: Duration,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Turn a successful upstream response into the caller's response
pub async fn relay_response(
    upstream: UpstreamResponse,
    stream: bool,
    options: RelayOptions,
) -> Result<Response, ApiError> {
    if stream {
        Ok(stream_response(upstream.body, options))
    } else {
        json_response(upstream.body, options).await
    }
}

/// Buffer the whole body and pass its JSON through unchanged
async fn json_response(body: UpstreamBody, options: RelayOptions) -> Result<Response, ApiError> {
    let bytes = collect_body(body, options.idle_timeout, usize::MAX)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to read upstream body: {}", e)))?;

    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| ApiError::Internal(format!("upstream body is not JSON: {}", e)))?;
    let payload = serde_json::to_vec(&value)
        .map_err(|e| ApiError::Internal(format!("failed to encode upstream body: {}", e)))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/json")),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
        ],
        payload,
    )
        .into_response())
}

/// Logs how a streamed relay ended when it is dropped
struct RelayGuard {
    started: Instant,
    bytes: usize,
    finished: bool,
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::debug!(
                bytes = self.bytes,
                duration_ms = self.started.elapsed().as_millis() as u64,
                "Stream relay dropped before completion, closing upstream"
            );
        }
    }
}

/// Relay the upstream body as a live event stream
fn stream_response(mut body: UpstreamBody, options: RelayOptions) -> Response {
    let idle_timeout = options.idle_timeout;

    let relayed = async_stream::stream! {
        let mut guard = RelayGuard { started: Instant::now(), bytes: 0, finished: false };
        let mut rechunker = Utf8Rechunker::default();

        loop {
            let next = match tokio::time::timeout(idle_timeout, body.next()).await {
                Ok(next) => next,
                Err(_) => Some(Err(UpstreamError::Timeout(idle_timeout))),
            };

            match next {
                Some(Ok(chunk)) => {
                    let out = rechunker.push(chunk);
                    if !out.is_empty() {
                        guard.bytes += out.len();
                        yield Ok::<Bytes, io::Error>(out);
                    }
                }
                Some(Err(e)) => {
                    tracing::error!(
                        error = %e,
                        bytes = guard.bytes,
                        "Upstream stream failed, aborting relay"
                    );
                    guard.finished = true;
                    yield Err(io::Error::other(e.to_string()));
                    break;
                }
                None => {
                    if let Some(rest) = rechunker.finish() {
                        guard.bytes += rest.len();
                        yield Ok(rest);
                    }
                    guard.finished = true;
                    tracing::debug!(
                        bytes = guard.bytes,
                        duration_ms = guard.started.elapsed().as_millis() as u64,
                        "Stream relay completed"
                    );
                    break;
                }
            }
        }
    };

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream")),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
            (
                header::HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
        ],
        Body::from_stream(relayed),
    )
        .into_response()
}

// ============================================================================
// Tests
// ============================================================================
