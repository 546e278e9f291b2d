//! Chat turn endpoint and history lookups.
//!
//! A chat turn persists the user message, runs the retrieval-and-answer
//! pipeline, resolves the citation and persists the assistant message with
//! its source link. Generation failure aborts the turn with a distinct
//! error; the user message stays persisted.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::rag::{AnswerError, ChatTurn};
use crate::security::require_api_key;
use crate::state::AppState;

const DEFAULT_HISTORY_LIMIT: i64 = 5;

#[derive(Debug, Deserialize)]
pub struct ChatTurnRequest {
    pub conversation_id: Uuid,
    pub message: String,
    #[serde(default = "default_use_rag")]
    pub use_rag: bool,
}

fn default_use_rag() -> bool {
    true
}

pub async fn chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<ChatTurnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_token)?;

    if payload.message.trim().is_empty() {
        return Err(ApiError::BadRequest("Message must not be empty".to_string()));
    }

    let conversation = state
        .store
        .get_conversation(payload.conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    let user_message = state
        .store
        .create_message(conversation.id, "user", &payload.message, None)
        .await?;

    let stored = state.store.fetch_messages(conversation.id, 0).await?;
    let history: Vec<ChatTurn> = stored
        .iter()
        .filter(|message| message.id != user_message.id)
        .map(ChatTurn::from_stored)
        .collect();

    let answer = state
        .engine
        .answer(&payload.message, conversation.id, history, payload.use_rag)
        .await
        .map_err(map_answer_error)?;

    let citation = state.citations.resolve(&answer).await?;

    let assistant_message = state
        .store
        .create_message(
            conversation.id,
            "assistant",
            &answer.response_text,
            citation.as_ref().map(|record| record.chunk_id),
        )
        .await?;

    let sources: Vec<Value> = answer
        .retrieved
        .iter()
        .map(|scored| {
            json!({
                "chunk_id": scored.chunk.id,
                "item_id": scored.chunk.item_id,
                "display_name": scored.chunk.item_display_name,
                "page": scored.chunk.page,
                "score": scored.score,
            })
        })
        .collect();

    Ok(Json(json!({
        "conversation_id": conversation.id,
        "message_id": assistant_message.id,
        "message": answer.response_text,
        "mode": answer.mode,
        "sources": sources,
        "citation": citation,
        "created_at": assistant_message.created_at,
    })))
}

pub async fn get_chat_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(conversation_id): Path<Uuid>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_token)?;

    state
        .store
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    let limit = params
        .get("limit")
        .and_then(|value| value.parse::<i64>().ok())
        .unwrap_or(DEFAULT_HISTORY_LIMIT);

    let messages = state.store.fetch_messages(conversation_id, limit).await?;
    Ok(Json(json!({ "messages": messages })))
}

pub async fn get_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((conversation_id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    require_api_key(&headers, &state.api_token)?;

    state
        .store
        .get_conversation(conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    let message = state
        .store
        .fetch_message(message_id)
        .await?
        .filter(|message| message.conversation_id == conversation_id)
        .ok_or_else(|| ApiError::NotFound("Message not found".to_string()))?;

    let mut body = serde_json::to_value(&message).map_err(ApiError::internal)?;

    if let Some(chunk_id) = message.source_embedding_id {
        if let Some(record) = state.citations.resolve_chunk(chunk_id).await? {
            if let Some(obj) = body.as_object_mut() {
                obj.insert("original_text".to_string(), json!(record.source_text));
                obj.insert("page".to_string(), json!(record.page));
                obj.insert("file_name".to_string(), json!(record.document_display_name));
                obj.insert("uri".to_string(), json!(record.document_uri));
                obj.insert("last_updated".to_string(), json!(record.last_updated));
            }
        }
    }

    Ok(Json(body))
}

fn map_answer_error(err: AnswerError) -> ApiError {
    match err {
        AnswerError::ModelUnavailable(_) | AnswerError::ModelTimeout(_) => {
            ApiError::GenerationFailed(err.to_string())
        }
        AnswerError::Storage(inner) => inner,
        AnswerError::Index(inner) => ApiError::internal(inner),
    }
}
