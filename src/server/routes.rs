//! Application routing
//!
//! This module defines all HTTP routes for the application.

use axum::{
    http::{header::HeaderName, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, Any, CorsLayer};

use crate::api::{chat_completions, health, models};
use crate::error::ApiError;
use crate::middleware::{
    auth::{require_api_key, AuthState},
    logging::{log_request, REQUEST_ID_HEADER, TRACE_ID_HEADER},
};
use crate::server::state::AppState;

/// Preflight cache lifetime
const CORS_MAX_AGE: Duration = Duration::from_secs(86400);

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // Health check routes (no authentication required)
    let health_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        .route("/liveness", get(health::liveness));

    let auth_state = AuthState::new(state.settings.clone());

    // OpenAI API routes
    let openai_routes = Router::new()
        .route(
            "/chat/completions",
            post(chat_completions::chat_completions).fallback(fallback),
        )
        .route(
            "/chat/completions/*rest",
            post(chat_completions::chat_completions).fallback(fallback),
        )
        .route("/models", get(models::list_models).fallback(fallback))
        .route("/models/:model_id", get(models::get_model).fallback(fallback));

    // Everything except the health probes is authenticated, including the
    // 404 for unmatched methods and paths.
    let api_routes = Router::new()
        .nest("/v1", openai_routes)
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(auth_state, require_api_key));

    // Layer order: last added = outermost = runs first
    Router::new()
        .merge(api_routes)
        .merge(health_routes)
        .layer(create_cors_layer())
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// Catch-all for unmatched routes and methods
async fn fallback() -> ApiError {
    ApiError::NotFound
}

/// Permissive CORS: any origin, the methods the gateway serves, and
/// whatever headers the browser asks for. Every `OPTIONS` request is
/// answered here, before routing and authentication.
fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::mirror_request())
        .max_age(CORS_MAX_AGE)
        .expose_headers([
            HeaderName::from_static(TRACE_ID_HEADER),
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
}

// ============================================================================
// Tests
// ============================================================================
