//! API error types

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::schemas::ErrorEnvelope;
use crate::services::dispatcher::DispatchError;

/// Public message for every server-side failure
pub const GENERIC_ERROR_MESSAGE: &str = "Gateway proxy error";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("All {attempts} upstream credentials failed (last status {last_status:?}): {last_message}")]
    DispatchExhausted {
        attempts: usize,
        last_status: Option<StatusCode>,
        last_message: String,
    },

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Configuration(_)
            | ApiError::DispatchExhausted { .. }
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show callers
    pub fn public_message(&self) -> &'static str {
        match self {
            ApiError::Unauthorized => "Unauthorized",
            ApiError::NotFound => "Not Found",
            ApiError::InvalidRequest(_) => "Invalid request body",
            ApiError::Configuration(_)
            | ApiError::DispatchExhausted { .. }
            | ApiError::Internal(_) => GENERIC_ERROR_MESSAGE,
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NoCredentials => ApiError::Configuration(err.to_string()),
            DispatchError::Exhausted {
                attempts,
                last_status,
                last_message,
            } => ApiError::DispatchExhausted {
                attempts,
                last_status,
                last_message,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            ApiError::Unauthorized | ApiError::NotFound => {
                tracing::debug!(status = status.as_u16(), "{}", self);
            }
            ApiError::InvalidRequest(_) => {
                tracing::warn!(status = status.as_u16(), error = %self, "Rejected request");
            }
            _ => {
                tracing::error!(status = status.as_u16(), error = %self, "Request failed");
            }
        }

        let body = Json(ErrorEnvelope::invalid_request(self.public_message()));
        let mut response = (status, body).into_response();
        response.headers_mut().insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        );
        response
    }
}
