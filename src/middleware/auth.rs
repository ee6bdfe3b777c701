//! Authentication middleware
//!
//! Callers authenticate with a single shared secret sent as
//! `Authorization: Bearer <key>`. When no key is configured the check is
//! skipped entirely.

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::ApiError;
use crate::utils::mask_secret;

/// Authentication state required by the middleware
#[derive(Clone)]
pub struct AuthState {
    pub settings: Arc<Settings>,
}

impl AuthState {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Check a raw `Authorization` header value against the gateway key
    pub fn is_authorized(&self, authorization: Option<&str>) -> bool {
        let Some(ref key) = self.settings.gateway_api_key else {
            return true;
        };

        match authorization {
            Some(value) => {
                let value = value.trim();
                value.strip_prefix("Bearer ").map(str::trim) == Some(key.as_str())
            }
            None => false,
        }
    }
}

/// Middleware to require the gateway bearer key
///
/// # Errors
/// - 401 Unauthorized: missing or wrong bearer key
pub async fn require_api_key(
    State(auth_state): State<AuthState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if !auth_state.settings.requires_api_key() {
        tracing::debug!("Gateway authentication disabled, skipping");
        return Ok(next.run(request).await);
    }

    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if !auth_state.is_authorized(authorization) {
        tracing::warn!(
            path = %request.uri().path(),
            presented = %authorization.map(mask_secret).unwrap_or_else(|| "-".to_string()),
            "Rejected request with missing or invalid bearer key"
        );
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn auth_state(key: Option<&str>) -> AuthState {
        AuthState::new(Arc::new(Settings {
            gateway_api_key: key.map(str::to_string),
            ..Settings::default()
        }))
    }

    #[test]
    fn test_matching_bearer_is_authorized() {
        let state = auth_state(Some("s3cret"));
        assert!(state.is_authorized(Some("Bearer s3cret")));
        assert!(state.is_authorized(Some("  Bearer s3cret  ")));
    }

    #[test]
    fn test_wrong_or_missing_bearer_is_rejected() {
        let state = auth_state(Some("s3cret"));
        assert!(!state.is_authorized(None));
        assert!(!state.is_authorized(Some("")));
        assert!(!state.is_authorized(Some("s3cret")));
        assert!(!state.is_authorized(Some("Bearer wrong")));
        assert!(!state.is_authorized(Some("Basic s3cret")));
        assert!(!state.is_authorized(Some("Bearer s3cret-and-more")));
    }

    #[test]
    fn test_no_key_disables_auth() {
        let state = auth_state(None);
        assert!(state.is_authorized(None));
        assert!(state.is_authorized(Some("Bearer anything")));
    }
}
