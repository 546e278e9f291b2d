use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A retrievable unit: one stored chunk embedding plus the provenance of its
/// owning document, resolved up front so citation needs no second lookup.
/// Built fresh from storage on every answer request, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievableChunk {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub text: String,
    pub conversation_id: Uuid,
    pub item_id: Uuid,
    pub item_uri: String,
    pub item_display_name: String,
    pub page: Option<i64>,
}

/// A chunk with its similarity score against the current query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: RetrievableChunk,
    pub score: f32,
}

/// How the answer was produced. `MemoryOnly` is the degraded mode used when
/// the conversation has no retrievable chunks (or retrieval was disabled);
/// callers skip citation resolution in that mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    Retrieval,
    MemoryOnly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResult {
    pub response_text: String,
    /// Retrieved chunks in rank order; empty in memory-only mode.
    pub retrieved: Vec<ScoredChunk>,
    /// The highest-ranked chunk, if any.
    pub top_chunk_id: Option<Uuid>,
    pub mode: AnswerMode,
}

/// Provenance record linking an answer back to its source chunk and document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationRecord {
    pub chunk_id: Uuid,
    pub source_text: String,
    pub page: Option<i64>,
    pub document_uri: String,
    pub document_display_name: String,
    pub last_updated: String,
}
