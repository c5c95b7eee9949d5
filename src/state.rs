use std::sync::Arc;

use thiserror::Error;

use crate::config::{AppConfig, AppPaths};
use crate::fixed_qa::FixedAnswerMatcher;
use crate::history::HistoryStore;
use crate::llm::{LlamaCppProvider, LlmProvider, LlmService};
use crate::orchestrator::Orchestrator;
use crate::rag::{Chunker, KnowledgeBase, SqliteChunkStore};
use crate::router::QueryRouter;
use crate::tools::{ToolRegistry, WeatherTool};

#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("failed to load configuration: {0}")]
    Config(#[source] anyhow::Error),

    #[error("failed to initialize history store: {0}")]
    History(#[source] anyhow::Error),

    #[error("failed to initialize knowledge base store: {0}")]
    KnowledgeBase(#[source] anyhow::Error),

    #[error("failed to initialize LLM provider: {0}")]
    Llm(#[source] anyhow::Error),

    #[error("failed to initialize tools: {0}")]
    Tools(#[source] anyhow::Error),
}

/// Global application state shared across all routes.
///
/// Every process-wide singleton (provider, stores, matcher, registry) is
/// constructed exactly once here and passed by reference — no hidden
/// globals, which also keeps the pieces swappable in tests.
#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<AppPaths>,
    pub config: Arc<AppConfig>,
    pub llm: LlmService,
    pub history: HistoryStore,
    pub knowledge_base: Arc<KnowledgeBase>,
    pub fixed_answers: Arc<FixedAnswerMatcher>,
    pub orchestrator: Arc<Orchestrator>,
}

impl AppState {
    /// Initializes the application state.
    ///
    /// 1. Load and validate configuration (fatal if the generation endpoint
    ///    is missing)
    /// 2. Open the history and knowledge base databases
    /// 3. Build the LLM provider/service and tool registry
    /// 4. Load the curated fixed answers (non-fatal if absent)
    /// 5. Assemble the router and orchestrator
    pub async fn initialize(paths: Arc<AppPaths>) -> Result<Arc<Self>, InitializationError> {
        let config = Arc::new(
            AppConfig::load(&paths.config_path())
                .map_err(|e| InitializationError::Config(e.into()))?,
        );

        let provider: Arc<dyn LlmProvider> = Arc::new(
            LlamaCppProvider::new(&config.llm).map_err(|e| InitializationError::Llm(e.into()))?,
        );
        let llm = LlmService::new(provider, config.llm.clone());

        let history = HistoryStore::new(paths.history_db_path.clone())
            .await
            .map_err(|e| InitializationError::History(e.into()))?;

        let chunk_store = Arc::new(
            SqliteChunkStore::with_path(paths.knowledge_base_dir.join("kb_index.db"))
                .await
                .map_err(|e| InitializationError::KnowledgeBase(e.into()))?,
        );
        let knowledge_base = Arc::new(KnowledgeBase::new(
            chunk_store,
            llm.clone(),
            Chunker::new(&config.knowledge_base),
            paths.knowledge_base_dir.join("chunks.json"),
        ));

        let fixed_answers = Arc::new(FixedAnswerMatcher::load(
            &config.fixed_qa_path(&paths),
            config.fixed_qa.threshold,
        ));
        if fixed_answers.is_empty() {
            tracing::warn!("no fixed answers loaded; every query will be routed");
        }

        let weather = WeatherTool::new(config.weather.clone())
            .map_err(|e| InitializationError::Tools(e.into()))?;
        let tools = Arc::new(ToolRegistry::new().register(Arc::new(weather)));

        let router = QueryRouter::new(llm.clone(), tools);
        let orchestrator = Arc::new(Orchestrator::new(
            router,
            knowledge_base.clone(),
            fixed_answers.clone(),
        ));

        Ok(Arc::new(AppState {
            paths,
            config,
            llm,
            history,
            knowledge_base,
            fixed_answers,
            orchestrator,
        }))
    }
}
