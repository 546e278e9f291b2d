//! OpenAI-compatible chat and embedding provider.
//!
//! Talks to any server exposing `/v1/chat/completions` and `/v1/embeddings`.
//! Every call carries a request timeout and passes through a semaphore that
//! bounds concurrent in-flight requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::Semaphore;

use super::provider::{LanguageModel, LlmError};
use super::types::ChatRequest;
use crate::core::config::LlmSettings;

#[derive(Clone)]
pub struct OpenAiCompatProvider {
    base_url: String,
    chat_model: String,
    embedding_model: String,
    api_key: Option<String>,
    timeout: Duration,
    client: Client,
    permits: Arc<Semaphore>,
}

impl OpenAiCompatProvider {
    pub fn new(settings: &LlmSettings) -> Self {
        let timeout = Duration::from_secs(settings.request_timeout_secs.max(1));
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            chat_model: settings.chat_model.clone(),
            embedding_model: settings.embedding_model.clone(),
            api_key: settings.api_key.clone(),
            timeout,
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            permits: Arc::new(Semaphore::new(settings.max_concurrent_requests.max(1))),
        }
    }

    fn classify(&self, err: reqwest::Error) -> LlmError {
        if err.is_timeout() {
            LlmError::Timeout(self.timeout)
        } else {
            LlmError::Unavailable(err.to_string())
        }
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, LlmError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|err| LlmError::Unavailable(err.to_string()))?;

        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|err| self.classify(err))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Unavailable(format!("{}: {}", status, text)));
        }

        response.json().await.map_err(|err| self.classify(err))
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/v1/models", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, LlmError> {
        let mut body = json!({
            "model": self.chat_model,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
            if let Some(s) = request.stop {
                obj.insert("stop".to_string(), json!(s));
            }
        }

        let payload = self.post_json("/v1/chat/completions", &body).await?;

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(|content| content.to_string())
            .ok_or_else(|| LlmError::Malformed("missing choices[0].message.content".to_string()))
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        let body = json!({
            "model": self.embedding_model,
            "input": inputs,
        });

        let payload = self.post_json("/v1/embeddings", &body).await?;

        let data = payload["data"]
            .as_array()
            .ok_or_else(|| LlmError::Malformed("missing data array".to_string()))?;

        let mut embeddings = Vec::with_capacity(data.len());
        for item in data {
            let values = item["embedding"]
                .as_array()
                .ok_or_else(|| LlmError::Malformed("missing embedding values".to_string()))?;
            let vector: Vec<f32> = values
                .iter()
                .filter_map(|v| v.as_f64().map(|f| f as f32))
                .collect();
            embeddings.push(vector);
        }

        if embeddings.len() != inputs.len() {
            return Err(LlmError::Malformed(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}
