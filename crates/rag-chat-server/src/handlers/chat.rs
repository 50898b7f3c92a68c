use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::models::chat::ChatRequest;
use crate::services::ChatService;
use crate::utils::error::ChatError;

/// Streams the reply as `text/plain`. Bad input is rejected with 400
/// before any body is sent; a backend failure mid-stream aborts the body.
pub async fn chat_stream_handler(
    State(chat_service): State<Arc<ChatService>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, ChatError> {
    info!(
        "Chat request: session={}, message_len={}, store={:?}",
        request.session_id,
        request.message.len(),
        request.vector_store_dir
    );

    let options = request.options();
    let stream = chat_service
        .stream_chat(&request.session_id, &request.message, options)
        .await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}
