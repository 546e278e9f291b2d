use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::state::AppState;

pub async fn health(State(_state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
    }))
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let llm_reachable = state.llm.health_check().await;
    Ok(Json(json!({
        "status": "ok",
        "llm_provider": state.llm.name(),
        "llm_reachable": llm_reachable,
    })))
}
