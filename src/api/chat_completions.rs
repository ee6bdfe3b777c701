//! OpenAI Chat Completions API endpoint
//!
//! `POST /v1/chat/completions`: the single path into the failover core.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Response,
};

use crate::error::ApiError;
use crate::schemas::ChatCompletionRequest;
use crate::server::state::AppState;
use crate::services::relay_response;

/// POST /v1/chat/completions - Create a chat completion
///
/// Decodes the body, applies the model policy, offers the request to each
/// upstream credential in turn and relays the first successful reply.
pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: ChatCompletionRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

    tracing::debug!(
        model = ?request.model(),
        messages = request.message_count(),
        stream = request.wants_stream(),
        "Received chat completion request"
    );

    let upstream_request = state
        .transformer
        .transform(request, &headers)
        .map_err(|e| ApiError::Internal(format!("failed to encode upstream request: {}", e)))?;

    let response = state.dispatcher.dispatch(&upstream_request).await?;

    relay_response(response, upstream_request.stream, state.relay).await
}
