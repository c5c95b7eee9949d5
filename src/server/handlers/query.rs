use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub session_id: Option<String>,
    #[serde(default)]
    pub use_rag: bool,
    pub k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub text: String,
    #[serde(default)]
    pub images: Vec<String>,
}

/// Answer one query within a session.
///
/// The history window is read before the in-flight turn is stored, so the
/// window never includes the message being answered.
pub async fn process_query(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<QueryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let query = payload.query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::BadRequest("query must not be empty".to_string()));
    }

    let session_id = match payload.session_id {
        Some(id) => id,
        None => state.history.create_session(None).await?,
    };

    let window = state
        .history
        .recent_window(&session_id, state.config.history.window)
        .await?;

    let k = payload.k.unwrap_or(state.config.knowledge_base.default_k);
    let result = state
        .orchestrator
        .process(&query, &window, payload.use_rag, k)
        .await;

    // Persist both turns; the structured result is flattened to its display
    // text for future history windows.
    state
        .history
        .add_message(&session_id, "user", &query, None)
        .await?;
    state
        .history
        .add_message(
            &session_id,
            "assistant",
            &result.text,
            Some(json!({ "kind": result.kind })),
        )
        .await?;

    Ok(Json(json!({
        "session_id": session_id,
        "result": result,
    })))
}

pub async fn upload_knowledge_base(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UploadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.orchestrator.upload(&payload.text, &payload.images).await;
    Ok(Json(outcome))
}
