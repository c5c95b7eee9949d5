use async_trait::async_trait;

use super::types::ChatRequest;
use crate::errors::ApiError;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// return the provider name (e.g. "llama_cpp")
    fn name(&self) -> &str;

    /// check if the inference server is healthy/reachable
    async fn health_check(&self) -> Result<bool, ApiError>;

    /// chat completion (non-streaming)
    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError>;

    /// generate embeddings
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError>;
}
