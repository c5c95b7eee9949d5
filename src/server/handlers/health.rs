use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::errors::ApiError;
use crate::llm::LlmProvider;
use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let model_reachable = state.llm.provider().health_check().await.unwrap_or(false);
    let chunk_count = state.knowledge_base.chunk_count().await.unwrap_or(0);

    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model_reachable": model_reachable,
        "knowledge_base_chunks": chunk_count,
    })))
}
