//! Upstream dispatch with ordered credential failover
//!
//! A request is offered to each credential of the pool in order, one call at
//! a time. The first response below 400 wins and is handed back untouched.
//! Failed attempts are logged and discarded; if every credential fails the
//! request is exhausted.

use axum::http::StatusCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::services::backend_pool::{Credential, CredentialPool};
use crate::services::transformer::UpstreamRequest;
use crate::services::upstream::{collect_body, UpstreamResponse, UpstreamTransport};

/// Most of an error body read for diagnostics
pub const ERROR_BODY_LIMIT: usize = 64 * 1024;

// ============================================================================
// Error Types
// ============================================================================

/// Failures that leave the dispatcher
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("No upstream credentials configured")]
    NoCredentials,

    #[error("All {attempts} upstream credentials failed, last error: {last_message}")]
    Exhausted {
        attempts: usize,
        last_status: Option<StatusCode>,
        last_message: String,
    },
}

// ============================================================================
// Attempt Outcome
// ============================================================================

/// Why a single attempt failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFailure {
    /// Upstream status, absent when no response was received
    pub status: Option<StatusCode>,
    /// Diagnostic for logs; never shown to callers
    pub message: String,
}

/// Result of one iteration of the dispatch loop
#[derive(Debug)]
pub enum AttemptOutcome {
    Succeeded(UpstreamResponse),
    Failed(AttemptFailure),
}

/// Pull a human readable diagnostic out of an upstream error body
///
/// Prefers a top-level `error` field: a string is used directly, an object
/// contributes its `message`, anything else is rendered as JSON. Without a
/// usable `error` field the status line is reported instead.
pub fn extract_error_message(status: StatusCode, body: &[u8]) -> String {
    let fallback = || format!("HTTP Error {}", status.as_u16());

    let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) else {
        return fallback();
    };

    match value.get("error") {
        None | Some(serde_json::Value::Null) | Some(serde_json::Value::Bool(false)) => fallback(),
        Some(serde_json::Value::String(msg)) if msg.is_empty() => fallback(),
        Some(serde_json::Value::String(msg)) => msg.clone(),
        Some(error) => match error.get("message").and_then(|m| m.as_str()) {
            Some(msg) if !msg.is_empty() => msg.to_string(),
            _ => error.to_string(),
        },
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Sequential failover over a fixed credential pool
#[derive(Clone)]
pub struct UpstreamDispatcher {
    pool: Arc<CredentialPool>,
    transport: Arc<dyn UpstreamTransport>,
    /// Maximum wait for each chunk of a failed attempt's body
    error_body_timeout: Duration,
}

impl UpstreamDispatcher {
    pub fn new(
        pool: Arc<CredentialPool>,
        transport: Arc<dyn UpstreamTransport>,
        error_body_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            transport,
            error_body_timeout,
        }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// Deliver `request` using the first credential that works
    pub async fn dispatch(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, DispatchError> {
        self.pool.ensure_usable()?;

        let total = self.pool.len();
        let started = Instant::now();
        let mut last_failure: Option<AttemptFailure> = None;

        for (index, credential) in self.pool.iter().enumerate() {
            let attempt = index + 1;

            match self.attempt(credential, request).await {
                AttemptOutcome::Succeeded(response) => {
                    tracing::info!(
                        credential = %credential.name(),
                        attempt = attempt,
                        total = total,
                        status = response.status.as_u16(),
                        model = ?request.model,
                        duration_ms = started.elapsed().as_millis() as u64,
                        "Upstream attempt succeeded"
                    );
                    return Ok(response);
                }
                AttemptOutcome::Failed(failure) => {
                    tracing::warn!(
                        credential = %credential.name(),
                        attempt = attempt,
                        total = total,
                        status = ?failure.status.map(|s| s.as_u16()),
                        error = %failure.message,
                        "Upstream attempt failed"
                    );
                    last_failure = Some(failure);
                }
            }
        }

        let last = last_failure.unwrap_or(AttemptFailure {
            status: None,
            message: "no attempt made".to_string(),
        });

        tracing::error!(
            attempts = total,
            last_status = ?last.status.map(|s| s.as_u16()),
            last_error = %last.message,
            duration_ms = started.elapsed().as_millis() as u64,
            "All upstream credentials failed"
        );

        Err(DispatchError::Exhausted {
            attempts: total,
            last_status: last.status,
            last_message: last.message,
        })
    }

    /// Run a single attempt and classify its result
    async fn attempt(&self, credential: &Credential, request: &UpstreamRequest) -> AttemptOutcome {
        tracing::debug!(credential = %credential.name(), "Starting upstream attempt");

        let response = match self.transport.send(credential, request).await {
            Ok(response) => response,
            Err(e) => {
                return AttemptOutcome::Failed(AttemptFailure {
                    status: None,
                    message: e.to_string(),
                })
            }
        };

        if response.status.as_u16() < 400 {
            return AttemptOutcome::Succeeded(response);
        }

        // A stalled or oversized error body must not hold up the next attempt
        let status = response.status;
        let drained = collect_body(response.body, self.error_body_timeout, ERROR_BODY_LIMIT).await;
        let message = match drained {
            Ok(body) => extract_error_message(status, &body),
            Err(e) => {
                tracing::debug!(
                    credential = %credential.name(),
                    error = %e,
                    "Could not read upstream error body"
                );
                format!("HTTP Error {}", status.as_u16())
            }
        };

        AttemptOutcome::Failed(AttemptFailure {
            status: Some(status),
            message,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
