//! Citation resolution: answer -> provenance record.
//!
//! A missing embedding or document is a soft failure; the citation is
//! omitted and the chat turn still succeeds.

use std::sync::Arc;

use uuid::Uuid;

use super::types::{AnswerResult, CitationRecord};
use crate::core::errors::ApiError;
use crate::storage::ConversationStore;

#[derive(Clone)]
pub struct CitationResolver {
    store: Arc<dyn ConversationStore>,
}

impl CitationResolver {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Resolves the answer's top chunk into a provenance record. `None` when
    /// the answer carries no citation (memory-only mode) or the source has
    /// since disappeared.
    pub async fn resolve(
        &self,
        answer: &AnswerResult,
    ) -> Result<Option<CitationRecord>, ApiError> {
        let Some(chunk_id) = answer.top_chunk_id else {
            return Ok(None);
        };
        self.resolve_chunk(chunk_id).await
    }

    pub async fn resolve_chunk(
        &self,
        chunk_id: Uuid,
    ) -> Result<Option<CitationRecord>, ApiError> {
        let Some(embedding) = self.store.fetch_embedding(chunk_id).await? else {
            tracing::warn!("Cited embedding {} no longer exists; omitting citation", chunk_id);
            return Ok(None);
        };

        let Some(document) = self.store.fetch_document(embedding.item_id).await? else {
            tracing::warn!(
                "Item {} behind cited embedding {} no longer exists; omitting citation",
                embedding.item_id,
                chunk_id
            );
            return Ok(None);
        };

        Ok(Some(CitationRecord {
            chunk_id,
            source_text: embedding.chunk_text,
            page: embedding.page,
            document_uri: document.uri,
            document_display_name: document.display_name,
            last_updated: document.last_updated,
        }))
    }
}
