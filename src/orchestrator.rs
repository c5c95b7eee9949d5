//! Top-level query orchestration.
//!
//! `process` is the single entry point for a query: retrieval first when RAG
//! is requested, then the curated fixed-answer check, then the router. Every
//! collaborator failure is caught at this boundary and converted into a
//! structured error result — callers never see a raw fault.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::ApiError;
use crate::fixed_qa::FixedAnswerMatcher;
use crate::llm::ChatMessage;
use crate::rag::{KnowledgeBase, RetrievedChunk};
use crate::router::{QueryRouter, ReplyKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Fixed,
    Rag,
    Tool,
    General,
    Error,
}

/// The final answer for one query. Constructed fresh per query and never
/// mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub text: String,
    /// Retrieved chunks backing the answer, formatted for display.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    pub kind: ResultKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub success: bool,
    pub message: String,
}

pub struct Orchestrator {
    router: QueryRouter,
    knowledge_base: Arc<KnowledgeBase>,
    fixed_answers: Arc<FixedAnswerMatcher>,
}

impl Orchestrator {
    pub fn new(
        router: QueryRouter,
        knowledge_base: Arc<KnowledgeBase>,
        fixed_answers: Arc<FixedAnswerMatcher>,
    ) -> Self {
        Self {
            router,
            knowledge_base,
            fixed_answers,
        }
    }

    /// Answer `query` with the most recent history window as context.
    ///
    /// This never fails: errors become `kind=error` results with a
    /// user-readable message.
    pub async fn process(
        &self,
        query: &str,
        history: &[ChatMessage],
        use_rag: bool,
        k: usize,
    ) -> QueryResult {
        tracing::info!(
            use_rag,
            k,
            history_len = history.len(),
            "processing query"
        );

        match self.process_inner(query, history, use_rag, k).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("query processing failed: {}", e);
                QueryResult {
                    text: format!("抱歉，处理您的请求时出现错误: {}", e),
                    evidence: None,
                    kind: ResultKind::Error,
                }
            }
        }
    }

    async fn process_inner(
        &self,
        query: &str,
        history: &[ChatMessage],
        use_rag: bool,
        k: usize,
    ) -> Result<QueryResult, ApiError> {
        if !use_rag {
            let reply = self.router.route(query, history, None).await?;
            return Ok(QueryResult {
                text: reply.text,
                evidence: None,
                kind: reply.kind.into(),
            });
        }

        // RAG mode: retrieval runs first, unconditionally, so even a fixed
        // answer can carry the evidence a live search would have produced.
        let retrieved = self.knowledge_base.search(query, k).await?;
        let evidence = format_evidence(&retrieved);

        if let Some(found) = self.fixed_answers.best_match(query) {
            return Ok(QueryResult {
                text: found.answer,
                evidence,
                kind: ResultKind::Fixed,
            });
        }

        if retrieved.is_empty() {
            tracing::info!("no context retrieved; falling back to general routing");
            let reply = self.router.route(query, history, None).await?;
            return Ok(QueryResult {
                text: reply.text,
                evidence: None,
                kind: reply.kind.into(),
            });
        }

        let context: String = retrieved
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let reply = self.router.route(query, history, Some(&context)).await?;

        Ok(QueryResult {
            text: reply.text,
            evidence,
            kind: ResultKind::Rag,
        })
    }

    pub async fn upload(&self, text: &str, images: &[String]) -> UploadOutcome {
        match self.knowledge_base.build(text, images).await {
            Ok(count) => UploadOutcome {
                success: true,
                message: format!("知识库构建成功，共索引 {} 个文本块", count),
            },
            Err(e) => {
                tracing::error!("knowledge base build failed: {}", e);
                UploadOutcome {
                    success: false,
                    message: format!("知识库构建失败: {}", e),
                }
            }
        }
    }
}

impl From<ReplyKind> for ResultKind {
    fn from(kind: ReplyKind) -> Self {
        match kind {
            ReplyKind::General => ResultKind::General,
            ReplyKind::Rag => ResultKind::Rag,
            ReplyKind::Tool => ResultKind::Tool,
        }
    }
}

/// Display form of the retrieved chunks, attached to results as evidence.
fn format_evidence(retrieved: &[RetrievedChunk]) -> Option<String> {
    if retrieved.is_empty() {
        return None;
    }

    let body = retrieved
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("**相关度 {}**：\n{}", i + 1, chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    Some(format!("找到 {} 条相关内容：\n\n{}", retrieved.len(), body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KnowledgeBaseConfig, LlmConfig, WeatherConfig};
    use crate::fixed_qa::FixedEntry;
    use crate::llm::LlmService;
    use crate::rag::{Chunker, SqliteChunkStore};
    use crate::testing::FakeLlmProvider;
    use crate::tools::{ToolRegistry, WeatherTool};

    async fn orchestrator_with(provider: Arc<FakeLlmProvider>) -> Orchestrator {
        let id = uuid::Uuid::new_v4();
        let db_path = std::env::temp_dir().join(format!("aria-orch-{}.db", id));
        let sidecar = std::env::temp_dir().join(format!("aria-orch-chunks-{}.json", id));

        let llm = LlmService::new(provider, LlmConfig::default());
        let store = Arc::new(SqliteChunkStore::with_path(db_path).await.unwrap());
        let knowledge_base = Arc::new(KnowledgeBase::new(
            store,
            llm.clone(),
            Chunker::new(&KnowledgeBaseConfig::default()),
            sidecar,
        ));

        let tools = Arc::new(
            ToolRegistry::new()
                .register(Arc::new(WeatherTool::new(WeatherConfig::default()).unwrap())),
        );
        let fixed = Arc::new(FixedAnswerMatcher::from_entries(
            vec![FixedEntry {
                questions: vec!["你是谁".to_string(), "自我介绍".to_string()],
                answer: "我是谢兴".to_string(),
            }],
            0.7,
        ));

        Orchestrator::new(QueryRouter::new(llm, tools), knowledge_base, fixed)
    }

    fn resume() -> String {
        let mut doc = String::from("## 项目经历\n问答系统：负责检索模块和查询路由的开发\n");
        doc.push_str("\n## 技能清单\n熟悉 Rust 与 Python，了解向量检索\n");
        doc
    }

    #[tokio::test]
    async fn fixed_answer_carries_live_retrieval_evidence() {
        let provider = Arc::new(FakeLlmProvider::default());
        let orch = orchestrator_with(provider).await;
        assert!(orch.upload(&resume(), &[]).await.success);

        let result = orch.process("你是谁啊", &[], true, 3).await;
        assert_eq!(result.kind, ResultKind::Fixed);
        assert_eq!(result.text, "我是谢兴");

        // Evidence equals what live retrieval returns for the same query.
        let retrieved = orch.knowledge_base.search("你是谁啊", 3).await.unwrap();
        assert_eq!(result.evidence, format_evidence(&retrieved));

        // And a second run is identical.
        let again = orch.process("你是谁啊", &[], true, 3).await;
        assert_eq!(again.text, result.text);
        assert_eq!(again.evidence, result.evidence);
    }

    #[tokio::test]
    async fn retrieved_context_forces_the_rag_branch() {
        let provider = Arc::new(FakeLlmProvider::with_replies(["根据资料，我负责检索模块"]));
        let orch = orchestrator_with(provider.clone()).await;
        assert!(orch.upload(&resume(), &[]).await.success);

        let result = orch.process("介绍一下问答系统里你负责的部分", &[], true, 3).await;
        assert_eq!(result.kind, ResultKind::Rag);
        assert!(result.text.contains("检索模块"));
        assert!(result.evidence.is_some());

        // The single completion ran in RAG mode with the context inlined.
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0]
            .messages
            .last()
            .unwrap()
            .content
            .contains("参考资料"));
    }

    #[tokio::test]
    async fn rag_mode_without_an_index_never_reports_rag() {
        let provider = Arc::new(FakeLlmProvider::with_replies(["可以聊聊别的吗"]));
        let orch = orchestrator_with(provider).await;

        let result = orch.process("给我讲讲宇宙", &[], true, 3).await;
        assert!(matches!(result.kind, ResultKind::General | ResultKind::Tool));
        assert!(result.evidence.is_none());
    }

    #[tokio::test]
    async fn non_rag_mode_skips_retrieval_entirely() {
        let provider = Arc::new(FakeLlmProvider::with_replies(["你好呀"]));
        let orch = orchestrator_with(provider).await;

        let result = orch.process("你好", &[], false, 3).await;
        assert_eq!(result.kind, ResultKind::General);
        assert_eq!(result.text, "你好呀");
        assert!(result.evidence.is_none());
    }

    #[tokio::test]
    async fn weather_flow_surfaces_as_a_tool_result() {
        let provider = Arc::new(FakeLlmProvider::with_replies([
            "我来查询",
            "出门带伞☂️",
        ]));
        let orch = orchestrator_with(provider).await;

        let result = orch.process("北京今天天气怎么样", &[], false, 3).await;
        assert_eq!(result.kind, ResultKind::Tool);
        assert!(result.text.contains("北京"));
        assert!(result.text.contains("气温18~25℃"));
    }

    #[tokio::test]
    async fn generation_failure_becomes_an_error_result() {
        let provider = Arc::new(FakeLlmProvider::failing_chat());
        let orch = orchestrator_with(provider).await;

        let result = orch.process("你好", &[], false, 3).await;
        assert_eq!(result.kind, ResultKind::Error);
        assert!(result.text.contains("抱歉"));
    }

    #[tokio::test]
    async fn empty_upload_reports_failure() {
        let provider = Arc::new(FakeLlmProvider::default());
        let orch = orchestrator_with(provider).await;

        let outcome = orch.upload("", &[]).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("失败"));
    }
}
