use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rag_enabled = state
        .chat
        .as_ref()
        .map(|chat| chat.rag_available())
        .unwrap_or(false);

    Json(json!({
        "status": "ok",
        "chat_ready": state.chat.is_some(),
        "rag_enabled": rag_enabled
    }))
}
