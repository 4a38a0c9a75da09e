use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::core::errors::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
}

/// One chat turn. A missing or blank `session_id` starts a new session
/// whose id is returned as `new_session_id`.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat = state.chat.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let existing = payload
        .session_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let is_new = existing.is_none();
    let session_id = existing.unwrap_or_else(|| Uuid::new_v4().to_string());

    let reply = chat.handle_turn(&payload.message, &session_id).await;

    if reply.should_persist() {
        chat.persist_exchange(
            &session_id,
            payload.message.trim(),
            &reply.answer,
            reply.generated_title.clone(),
        )
        .await;
    }

    let mut body = json!({ "response": reply.answer });
    if is_new {
        body["new_session_id"] = json!(session_id);
    }
    if let Some(title) = reply.generated_title {
        body["title"] = json!(title);
    }

    Ok(Json(body))
}
