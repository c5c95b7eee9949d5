use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::provider::LlmProvider;
use super::types::ChatRequest;
use crate::config::LlmConfig;
use crate::errors::ApiError;

/// OpenAI-compatible HTTP provider for a local llama.cpp-style server.
///
/// The client carries a hard request timeout so a hung inference server
/// surfaces as a per-request `Generation` error instead of blocking the
/// caller indefinitely.
#[derive(Clone)]
pub struct LlamaCppProvider {
    base_url: String,
    chat_model: String,
    embedding_model: String,
    client: Client,
}

impl LlamaCppProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(ApiError::internal)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            client,
        })
    }
}

#[async_trait]
impl LlmProvider for LlamaCppProvider {
    fn name(&self) -> &str {
        "llama_cpp"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        let url = format!("{}/v1/models", self.base_url);
        match self.client.get(&url).send().await {
            Ok(resp) => Ok(resp.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        let url = format!("{}/v1/chat/completions", self.base_url);

        let mut body = json!({
            "model": self.chat_model,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature {
                obj.insert("temperature".to_string(), json!(t));
            }
            if let Some(t) = request.top_p {
                obj.insert("top_p".to_string(), json!(t));
            }
            if let Some(t) = request.max_tokens {
                obj.insert("max_tokens".to_string(), json!(t));
            }
            if let Some(s) = request.stop {
                obj.insert("stop".to_string(), json!(s));
            }
        }

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::generation)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Generation(format!("chat error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::generation)?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .trim()
            .to_string();

        Ok(content)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let url = format!("{}/v1/embeddings", self.base_url);

        let body = json!({
            "model": self.embedding_model,
            "input": inputs,
        });

        let res = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(ApiError::generation)?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(ApiError::Generation(format!("embed error: {}", text)));
        }

        let payload: Value = res.json().await.map_err(ApiError::generation)?;

        let mut embeddings = Vec::new();
        if let Some(data) = payload["data"].as_array() {
            for item in data {
                if let Some(vals) = item["embedding"].as_array() {
                    let vec: Vec<f32> = vals
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect();
                    embeddings.push(vec);
                }
            }
        }

        if embeddings.len() != inputs.len() {
            return Err(ApiError::Generation(format!(
                "embedding count mismatch: requested {}, got {}",
                inputs.len(),
                embeddings.len()
            )));
        }

        Ok(embeddings)
    }
}
