//! Embedding lookup: stored chunk embeddings -> retrievable units.
//!
//! Provenance is resolved once per distinct item, not once per chunk, so a
//! conversation with many chunks of the same document costs one document
//! fetch.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::types::RetrievableChunk;
use crate::core::errors::ApiError;
use crate::storage::{ConversationStore, DocumentRecord};

#[derive(Clone)]
pub struct EmbeddingLookup {
    store: Arc<dyn ConversationStore>,
}

impl EmbeddingLookup {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// All retrievable chunks of the conversation's active items, in a
    /// stable order. Empty when the conversation has no documents yet.
    pub async fn fetch_active_chunks(
        &self,
        conversation_id: Uuid,
    ) -> Result<Vec<RetrievableChunk>, ApiError> {
        let embeddings = self.store.fetch_active_embeddings(conversation_id).await?;
        if embeddings.is_empty() {
            return Ok(Vec::new());
        }

        let mut documents: HashMap<Uuid, DocumentRecord> = HashMap::new();
        for embedding in &embeddings {
            if documents.contains_key(&embedding.item_id) {
                continue;
            }
            match self.store.fetch_document(embedding.item_id).await? {
                Some(document) => {
                    documents.insert(embedding.item_id, document);
                }
                None => {
                    tracing::warn!(
                        "Embedding {} references missing item {}",
                        embedding.id,
                        embedding.item_id
                    );
                }
            }
        }

        let chunks = embeddings
            .into_iter()
            .filter_map(|embedding| {
                let document = documents.get(&embedding.item_id)?;
                Some(RetrievableChunk {
                    id: embedding.id,
                    vector: embedding.vector,
                    text: embedding.chunk_text,
                    conversation_id: embedding.conversation_id,
                    item_id: embedding.item_id,
                    item_uri: document.uri.clone(),
                    item_display_name: document.display_name.clone(),
                    page: embedding.page,
                })
            })
            .collect();

        Ok(chunks)
    }
}
