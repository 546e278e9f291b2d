//! Conversation-scoped retrieval-and-answer pipeline.
//!
//! Per chat turn: stored chunk embeddings become a request-local vector
//! index, the persisted history becomes a token-bounded memory window, and
//! the answer engine feeds both to the language model, returning an answer
//! with a citation pointer back to the best-matching chunk.

pub mod citation;
pub mod engine;
pub mod index;
pub mod lookup;
pub mod memory;
pub mod types;

pub use citation::CitationResolver;
pub use engine::{AnswerEngine, AnswerError};
pub use index::{EphemeralIndex, IndexError};
pub use lookup::EmbeddingLookup;
pub use memory::{build_context, ChatTurn, TurnRole};
pub use types::{AnswerMode, AnswerResult, CitationRecord, RetrievableChunk, ScoredChunk};
