//! OpenAI Models API endpoint
//!
//! Static listing of the model ids this gateway advertises. Listing never
//! touches the upstream.

use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::ApiError;
use crate::schemas::openai::{Model, ModelsResponse};
use crate::server::state::AppState;

fn available_models(state: &AppState) -> Vec<Model> {
    state
        .settings
        .listed_models
        .iter()
        .map(Model::listed)
        .collect()
}

/// GET /v1/models - List available models
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let models = available_models(&state);

    tracing::debug!(model_count = models.len(), "Listing available models");

    Json(ModelsResponse {
        object: "list".to_string(),
        data: models,
    })
}

/// GET /v1/models/{model_id} - Retrieve a model
pub async fn get_model(
    State(state): State<AppState>,
    Path(model_id): Path<String>,
) -> Result<Json<Model>, ApiError> {
    available_models(&state)
        .into_iter()
        .find(|m| m.id == model_id)
        .map(Json)
        .ok_or_else(|| {
            tracing::debug!(model_id = %model_id, "Model not found");
            ApiError::NotFound
        })
}
