use std::sync::Arc;

use crate::config::LlmConfig;
use crate::errors::ApiError;
use crate::llm::prompts;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{ChatMessage, ChatRequest, PromptMode};

/// Generation client: prompt assembly plus the per-mode sampling policy.
///
/// RAG completions decode at temperature 0.1 to keep the model close to the
/// retrieved material; weather tips are capped to a short token budget;
/// everything else runs at the configured defaults.
#[derive(Clone)]
pub struct LlmService {
    provider: Arc<dyn LlmProvider>,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub async fn generate(
        &self,
        mode: PromptMode,
        query: &str,
        history: &[ChatMessage],
        context: Option<&str>,
    ) -> Result<String, ApiError> {
        let messages = prompts::assemble(mode, query, history, context);
        let request = self.request_for(mode, messages);

        tracing::debug!(mode = mode.as_str(), "requesting completion");
        self.provider.chat(request).await
    }

    pub async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        self.provider.embed(inputs).await
    }

    fn request_for(&self, mode: PromptMode, messages: Vec<ChatMessage>) -> ChatRequest {
        let mut request = ChatRequest::new(messages);
        match mode {
            PromptMode::Rag => {
                request.temperature = Some(0.1);
                request.max_tokens = Some(self.config.max_tokens);
            }
            PromptMode::WeatherTip => {
                request.temperature = Some(self.config.temperature);
                request.top_p = Some(self.config.top_p);
                request.max_tokens = Some(self.config.tip_max_tokens);
            }
            PromptMode::General | PromptMode::ToolResult => {
                request.temperature = Some(self.config.temperature);
                request.top_p = Some(self.config.top_p);
                request.max_tokens = Some(self.config.max_tokens);
            }
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::PromptMode;

    fn service() -> LlmService {
        use crate::testing::FakeLlmProvider;
        LlmService::new(Arc::new(FakeLlmProvider::default()), LlmConfig::default())
    }

    #[test]
    fn rag_mode_decodes_near_deterministically() {
        let svc = service();
        let request = svc.request_for(PromptMode::Rag, vec![ChatMessage::user("q")]);
        assert_eq!(request.temperature, Some(0.1));
    }

    #[test]
    fn tip_mode_is_length_capped() {
        let svc = service();
        let request = svc.request_for(PromptMode::WeatherTip, vec![ChatMessage::user("q")]);
        assert_eq!(request.max_tokens, Some(64));
    }

    #[tokio::test]
    async fn embed_of_nothing_is_empty_without_a_provider_call() {
        let svc = service();
        let vecs = svc.embed(&[]).await.unwrap();
        assert!(vecs.is_empty());
    }
}
