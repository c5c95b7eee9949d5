use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub title: String,
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.history.list_sessions().await?;
    Ok(Json(json!({ "sessions": sessions })))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = state.history.create_session(payload.title).await?;
    let session = state.history.get_session(&session_id).await?;
    Ok(Json(json!({ "session": session })))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session = state
        .history
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;

    Ok(Json(json!({ "session": session })))
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<UpdateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .history
        .get_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("session not found".to_string()))?;

    state
        .history
        .update_session_title(&session_id, &payload.title)
        .await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.history.delete_session(&session_id).await?;
    Ok(Json(json!({ "ok": true })))
}

pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.history.get_history(&session_id, 0).await?;
    let payload: Vec<Value> = messages
        .into_iter()
        .map(|msg| {
            json!({
                "role": msg.role,
                "content": msg.content,
                "created_at": msg.created_at,
                "metadata": msg.metadata,
            })
        })
        .collect();

    Ok(Json(json!({ "messages": payload })))
}
