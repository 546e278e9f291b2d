//! Persistence layer for conversations, messages, items and chunk embeddings.
//!
//! The retrieval pipeline only ever reads through the [`ConversationStore`]
//! trait; writes (message persistence, item management) belong to the HTTP
//! handlers and to the ingestion pipeline that produces the stored embeddings.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::errors::ApiError;

pub use sqlite::SqliteStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub id: Uuid,
    pub user_id: String,
    pub title: String,
    pub context: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A source document ("item") attached to a conversation. Only chunks of
/// active items are retrievable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub uri: String,
    pub display_name: String,
    pub active: bool,
    pub last_updated: String,
}

/// A pre-embedded chunk of a document, as produced by the ingestion pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEmbedding {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub item_id: Uuid,
    pub chunk_text: String,
    pub vector: Vec<f32>,
    pub page: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: String,
    pub content: String,
    pub source_embedding_id: Option<Uuid>,
    pub created_at: String,
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
        context: &str,
    ) -> Result<ConversationRecord, ApiError>;

    async fn get_conversation(
        &self,
        conversation_id: Uuid,
    ) -> Result<Option<ConversationRecord>, ApiError>;

    /// Lists conversations, optionally filtered by exact title.
    async fn list_conversations(
        &self,
        title: Option<&str>,
    ) -> Result<Vec<ConversationRecord>, ApiError>;

    async fn update_conversation(
        &self,
        conversation_id: Uuid,
        title: Option<&str>,
        context: Option<&str>,
    ) -> Result<Option<ConversationRecord>, ApiError>;

    async fn delete_conversation(&self, conversation_id: Uuid) -> Result<bool, ApiError>;

    async fn upsert_item(&self, item: DocumentRecord) -> Result<(), ApiError>;

    async fn list_items(&self, conversation_id: Uuid) -> Result<Vec<DocumentRecord>, ApiError>;

    async fn count_items(&self, conversation_id: Uuid) -> Result<i64, ApiError>;

    async fn fetch_document(&self, item_id: Uuid) -> Result<Option<DocumentRecord>, ApiError>;

    async fn insert_embedding(&self, embedding: StoredEmbedding) -> Result<(), ApiError>;

    /// All embeddings of the conversation whose owning item is active, in a
    /// stable order.
    async fn fetch_active_embeddings(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<StoredEmbedding>, ApiError>;

    async fn fetch_embedding(
        &self,
        embedding_id: Uuid,
    ) -> Result<Option<StoredEmbedding>, ApiError>;

    async fn create_message(
        &self,
        conversation_id: Uuid,
        role: &str,
        content: &str,
        source_embedding_id: Option<Uuid>,
    ) -> Result<StoredMessage, ApiError>;

    /// The latest `limit` messages of the conversation in chronological
    /// order; `limit <= 0` returns the full history.
    async fn fetch_messages(
        &self,
        conversation_id: Uuid,
        limit: i64,
    ) -> Result<Vec<StoredMessage>, ApiError>;

    async fn fetch_message(&self, message_id: Uuid) -> Result<Option<StoredMessage>, ApiError>;
}
