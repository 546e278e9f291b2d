use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::types::ChatRequest;

/// Failure modes of an external model call. `Timeout` and `Unavailable` are
/// kept distinct so callers can report them separately.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("model endpoint unavailable: {0}")]
    Unavailable(String),
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed model response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// provider name (e.g. "openai-compat")
    fn name(&self) -> &str;

    /// check if the provider is reachable
    async fn health_check(&self) -> bool;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError>;

    /// generate embeddings, one vector per input
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError>;
}
