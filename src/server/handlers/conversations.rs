use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::security::require_api_key;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub title: String,
    #[serde(default)]
    pub context: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateConversationRequest {
    pub title: Option<String>,
    pub context: Option<String>,
}

pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_token)?;

    if payload.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title must not be empty".to_string()));
    }

    let conversation = state
        .store
        .create_conversation("", &payload.title, &payload.context)
        .await?;

    Ok(Json(json!({ "conversation": conversation })))
}

pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_token)?;

    let title = params.get("title").map(String::as_str);
    let conversations = state.store.list_conversations(title).await?;

    if title.is_some() && conversations.is_empty() {
        return Err(ApiError::NotFound("Conversation not found".to_string()));
    }

    Ok(Json(json!({ "conversations": conversations })))
}

pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_token)?;

    let conversation = state
        .store
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    Ok(Json(json!({ "conversation": conversation })))
}

pub async fn update_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
    Json(payload): Json<UpdateConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_token)?;

    let conversation = state
        .store
        .update_conversation(
            conversation_id,
            payload.title.as_deref(),
            payload.context.as_deref(),
        )
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    Ok(Json(json!({ "conversation": conversation })))
}

pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_token)?;

    state
        .store
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    let item_count = state.store.count_items(conversation_id).await?;
    if item_count > 0 {
        return Err(ApiError::BadRequest("Conversation has items".to_string()));
    }

    state.store.delete_conversation(conversation_id).await?;

    Ok(Json(json!({
        "message": "Conversation deleted successfully",
        "id": conversation_id,
    })))
}

pub async fn list_items(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_token)?;

    state
        .store
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    let items = state.store.list_items(conversation_id).await?;
    Ok(Json(json!({ "items": items })))
}
