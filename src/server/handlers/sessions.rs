use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateSessionRequest {
    pub title: String,
}

pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let sessions = state.history.list_sessions().await?;
    let result: Vec<Value> = sessions
        .into_iter()
        .map(|session| json!({ "id": session.id, "title": session.title }))
        .collect();
    Ok(Json(json!({ "sessions": result })))
}

pub async fn get_session_messages(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let messages = state.history.load_all(&session_id).await?;
    let formatted: Vec<Value> = messages
        .into_iter()
        .map(|msg| {
            json!({
                "role": msg.role,
                "content": msg.content,
                "created_at": msg.created_at
            })
        })
        .collect();
    Ok(Json(json!({ "messages": formatted })))
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<UpdateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if payload.title.chars().count() > 160 {
        return Err(ApiError::BadRequest("Title is too long".to_string()));
    }

    let updated = state
        .history
        .set_custom_title(&session_id, &payload.title)
        .await?;
    if !updated {
        return Err(ApiError::NotFound("Session not found".to_string()));
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted_count = state.history.purge(&session_id).await?;
    tracing::info!("[{}] Deleted session ({} messages)", session_id, deleted_count);
    Ok(Json(json!({ "success": true, "deleted_count": deleted_count })))
}
