//! Test doubles shared across module tests.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::ApiError;
use crate::llm::provider::LlmProvider;
use crate::llm::types::ChatRequest;

/// Deterministic in-process provider.
///
/// Chat replies are drained from a scripted queue; once the queue is empty it
/// echoes the final user turn. Embeddings are character-bucket histograms so
/// texts sharing characters score as similar, which is enough to make top-k
/// retrieval meaningful in tests.
#[derive(Default)]
pub struct FakeLlmProvider {
    replies: Mutex<VecDeque<String>>,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub fail_chat: Mutex<bool>,
    pub fail_embed: Mutex<bool>,
}

impl FakeLlmProvider {
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Default::default()
        }
    }

    pub fn failing_chat() -> Self {
        Self {
            fail_chat: Mutex::new(true),
            ..Default::default()
        }
    }

    pub fn failing_embed() -> Self {
        Self {
            fail_embed: Mutex::new(true),
            ..Default::default()
        }
    }
}

pub fn bucket_embedding(text: &str) -> Vec<f32> {
    const DIM: usize = 16;
    let mut buckets = vec![0.0f32; DIM];
    for c in text.chars().filter(|c| c.is_alphanumeric()) {
        let mut hasher = DefaultHasher::new();
        c.hash(&mut hasher);
        buckets[(hasher.finish() % DIM as u64) as usize] += 1.0;
    }
    let norm = buckets.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut buckets {
            *v /= norm;
        }
    }
    buckets
}

#[async_trait]
impl LlmProvider for FakeLlmProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn health_check(&self) -> Result<bool, ApiError> {
        Ok(true)
    }

    async fn chat(&self, request: ChatRequest) -> Result<String, ApiError> {
        if *self.fail_chat.lock().unwrap() {
            return Err(ApiError::Generation("model unavailable".to_string()));
        }

        let fallback = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| format!("回答：{}", m.content))
            .unwrap_or_default();
        self.requests.lock().unwrap().push(request);

        let scripted = self.replies.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or(fallback))
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if *self.fail_embed.lock().unwrap() {
            return Err(ApiError::Generation("embedding model unavailable".to_string()));
        }
        Ok(inputs.iter().map(|s| bucket_embedding(s)).collect())
    }
}
