pub mod openai;
pub mod provider;
pub mod types;

pub use openai::OpenAiCompatProvider;
pub use provider::{LanguageModel, LlmError};
pub use types::{ChatMessage, ChatRequest};
