//! Typed application settings.
//!
//! Loaded from an optional `settings.yml`, then overridden by environment
//! variables. Values that are absent fall back to the defaults below, so a
//! fresh checkout runs without any configuration file.

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::paths::AppPaths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub llm: LlmSettings,
    pub rag: RagSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Base URL of an OpenAI-compatible server.
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
    /// Upper bound on in-flight model calls.
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    /// Number of chunks retrieved per answer request.
    pub top_k: usize,
    /// Token budget for the chat memory window.
    pub memory_token_budget: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 8080,
            allowed_origins: Vec::new(),
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:1234".to_string(),
            chat_model: "default".to_string(),
            embedding_model: "default".to_string(),
            api_key: None,
            request_timeout_secs: 60,
            max_concurrent_requests: 2,
        }
    }
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            top_k: 3,
            memory_token_budget: 4096,
        }
    }
}

impl Settings {
    pub fn load(paths: &AppPaths) -> Self {
        let mut settings = load_yaml_file(&paths.settings_path);
        settings.apply_env_overrides();
        settings
    }

    fn apply_env_overrides(&mut self) {
        if let Some(port) = env_parsed::<u16>("DOCCHAT_PORT") {
            self.server.port = port;
        }
        if let Ok(url) = env::var("DOCCHAT_LLM_BASE_URL") {
            if !url.trim().is_empty() {
                self.llm.base_url = url;
            }
        }
        if let Ok(key) = env::var("DOCCHAT_LLM_API_KEY") {
            if !key.trim().is_empty() {
                self.llm.api_key = Some(key);
            }
        }
        if let Some(k) = env_parsed::<usize>("DOCCHAT_RAG_TOP_K") {
            self.rag.top_k = k;
        }
        if let Some(budget) = env_parsed::<usize>("DOCCHAT_MEMORY_TOKEN_BUDGET") {
            self.rag.memory_token_budget = budget;
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.parse::<T>().ok())
}

fn load_yaml_file(path: &Path) -> Settings {
    let Ok(raw) = fs::read_to_string(path) else {
        return Settings::default();
    };

    match serde_yaml::from_str(&raw) {
        Ok(settings) => settings,
        Err(err) => {
            tracing::warn!("Ignoring malformed settings file {}: {}", path.display(), err);
            Settings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let settings = Settings::default();
        assert_eq!(settings.rag.top_k, 3);
        assert_eq!(settings.rag.memory_token_budget, 4096);
        assert!(settings.llm.max_concurrent_requests >= 1);
    }

    #[test]
    fn partial_yaml_keeps_defaults_for_the_rest() {
        let settings: Settings = serde_yaml::from_str("rag:\n  top_k: 5\n").unwrap();
        assert_eq!(settings.rag.top_k, 5);
        assert_eq!(settings.rag.memory_token_budget, 4096);
        assert_eq!(settings.server.port, 8080);
    }
}
