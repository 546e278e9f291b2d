//! Answer engine: one chat turn end to end.
//!
//! Retrieval, memory windowing and the model call run as a single
//! synchronous pipeline per request. The index and the memory window are
//! request-local and discarded afterwards.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use super::index::{EphemeralIndex, IndexError};
use super::lookup::EmbeddingLookup;
use super::memory::{build_context, ChatTurn};
use super::types::{AnswerMode, AnswerResult, ScoredChunk};
use crate::core::config::RagSettings;
use crate::core::errors::ApiError;
use crate::llm::{ChatMessage, ChatRequest, LanguageModel, LlmError};
use crate::storage::ConversationStore;

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("language model timed out {0}")]
    ModelTimeout(String),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Storage(#[from] ApiError),
}

impl From<LlmError> for AnswerError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout(duration) => {
                AnswerError::ModelTimeout(format!("after {:?}", duration))
            }
            LlmError::Unavailable(msg) => AnswerError::ModelUnavailable(msg),
            LlmError::Malformed(msg) => {
                AnswerError::ModelUnavailable(format!("malformed response: {}", msg))
            }
        }
    }
}

pub struct AnswerEngine {
    lookup: EmbeddingLookup,
    llm: Arc<dyn LanguageModel>,
    settings: RagSettings,
}

impl AnswerEngine {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        llm: Arc<dyn LanguageModel>,
        settings: RagSettings,
    ) -> Self {
        Self {
            lookup: EmbeddingLookup::new(store),
            llm,
            settings,
        }
    }

    /// Answers `query_text` within the conversation. `history` is the
    /// persisted turn sequence (without the live query). When the
    /// conversation has no retrievable chunks, or `use_retrieval` is false,
    /// the engine answers from memory alone and says so via `mode`.
    pub async fn answer(
        &self,
        query_text: &str,
        conversation_id: Uuid,
        history: Vec<ChatTurn>,
        use_retrieval: bool,
    ) -> Result<AnswerResult, AnswerError> {
        let chunks = if use_retrieval {
            self.lookup.fetch_active_chunks(conversation_id).await?
        } else {
            Vec::new()
        };

        let (retrieved, mode) = if chunks.is_empty() {
            if use_retrieval {
                tracing::debug!(
                    "No retrievable chunks for conversation {}; answering from memory alone",
                    conversation_id
                );
            }
            (Vec::new(), AnswerMode::MemoryOnly)
        } else {
            let query_vector = self.embed_query(query_text).await?;
            let index = EphemeralIndex::build(chunks)?;
            let hits = index.query(&query_vector, self.settings.top_k);
            tracing::debug!(
                "Retrieved {} of {} chunks for conversation {}",
                hits.len(),
                index.len(),
                conversation_id
            );
            (hits, AnswerMode::Retrieval)
        };

        let window = build_context(history, self.settings.memory_token_budget);
        let prompt = build_prompt(&window, &retrieved, query_text);

        let response_text = self.llm.chat(ChatRequest::new(prompt)).await?;

        let top_chunk_id = retrieved.first().map(|scored| scored.chunk.id);
        Ok(AnswerResult {
            response_text,
            retrieved,
            top_chunk_id,
            mode,
        })
    }

    async fn embed_query(&self, query_text: &str) -> Result<Vec<f32>, AnswerError> {
        let inputs = [query_text.to_string()];
        let mut vectors = self.llm.embed(&inputs).await?;
        if vectors.is_empty() {
            return Err(AnswerError::ModelUnavailable(
                "empty embedding response".to_string(),
            ));
        }
        Ok(vectors.remove(0))
    }
}

fn build_prompt(
    window: &[ChatTurn],
    retrieved: &[ScoredChunk],
    query_text: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(window.len() + 2);

    if retrieved.is_empty() {
        messages.push(ChatMessage::new(
            "system",
            "You are a helpful assistant. Answer using the conversation so far.",
        ));
    } else {
        messages.push(ChatMessage::new(
            "system",
            format!(
                "You are a helpful assistant. Answer using the conversation so far \
                 and the following document excerpts.\n\n{}",
                format_chunk_block(retrieved)
            ),
        ));
    }

    for turn in window {
        messages.push(ChatMessage::new(turn.role.as_str(), turn.content.clone()));
    }

    messages.push(ChatMessage::new("user", query_text));
    messages
}

fn format_chunk_block(retrieved: &[ScoredChunk]) -> String {
    let mut block = String::new();
    for (i, scored) in retrieved.iter().enumerate() {
        let page = scored
            .chunk
            .page
            .map(|p| format!(", page {}", p))
            .unwrap_or_default();
        block.push_str(&format!(
            "[{}] (Source: {}{})\n{}\n\n",
            i + 1,
            scored.chunk.item_display_name,
            page,
            scored.chunk.text
        ));
    }
    block.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::memory::TurnRole;
    use crate::rag::types::RetrievableChunk;

    fn make_scored(text: &str, name: &str, page: Option<i64>, score: f32) -> ScoredChunk {
        ScoredChunk {
            chunk: RetrievableChunk {
                id: Uuid::new_v4(),
                vector: vec![1.0],
                text: text.to_string(),
                conversation_id: Uuid::new_v4(),
                item_id: Uuid::new_v4(),
                item_uri: "file://doc".to_string(),
                item_display_name: name.to_string(),
                page,
            },
            score,
        }
    }

    fn make_turn(role: TurnRole, content: &str) -> ChatTurn {
        ChatTurn {
            role,
            content: content.to_string(),
            conversation_id: Uuid::new_v4(),
            created_at: "2025-06-01T00:00:00Z".to_string(),
            source_chunk_id: None,
        }
    }

    #[test]
    fn chunk_block_numbers_sources_and_pages() {
        let block = format_chunk_block(&[
            make_scored("First excerpt.", "report.pdf", Some(3), 0.9),
            make_scored("Second excerpt.", "notes.md", None, 0.5),
        ]);

        assert!(block.contains("[1] (Source: report.pdf, page 3)"));
        assert!(block.contains("First excerpt."));
        assert!(block.contains("[2] (Source: notes.md)"));
        assert!(!block.ends_with('\n'));
    }

    #[test]
    fn prompt_ends_with_the_query_as_user_turn() {
        let window = vec![
            make_turn(TurnRole::User, "earlier question"),
            make_turn(TurnRole::Assistant, "earlier answer"),
        ];
        let prompt = build_prompt(&window, &[], "what about now?");

        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[0].role, "system");
        assert_eq!(prompt[1].content, "earlier question");
        assert_eq!(prompt[2].role, "assistant");
        assert_eq!(prompt.last().unwrap().role, "user");
        assert_eq!(prompt.last().unwrap().content, "what about now?");
    }

    #[test]
    fn prompt_embeds_excerpts_only_when_retrieval_ran() {
        let without = build_prompt(&[], &[], "q");
        assert!(!without[0].content.contains("excerpts"));

        let with = build_prompt(&[], &[make_scored("text", "doc", None, 1.0)], "q");
        assert!(with[0].content.contains("document excerpts"));
        assert!(with[0].content.contains("text"));
    }
}
