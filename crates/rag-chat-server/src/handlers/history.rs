use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::models::chat::{HistoryResponse, SessionSummary};
use crate::services::ChatService;
use crate::utils::error::ChatError;

pub async fn history_handler(
    State(chat_service): State<Arc<ChatService>>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ChatError> {
    chat_service.get_history(&session_id).map(Json)
}

pub async fn list_sessions_handler(
    State(chat_service): State<Arc<ChatService>>,
) -> Json<Vec<SessionSummary>> {
    Json(chat_service.list_sessions())
}
