use axum::{extract::State, Json};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::models::chat::{RetrievalRequest, RetrievalResponse};
use crate::services::RetrievalRouter;
use crate::utils::error::ChatError;

pub async fn vector_store_query_handler(
    State(retrieval): State<Option<Arc<RetrievalRouter>>>,
    Json(request): Json<RetrievalRequest>,
) -> Result<Json<RetrievalResponse>, ChatError> {
    let router = retrieval.ok_or_else(|| ChatError::unavailable("Retrieval is disabled"))?;

    let start = Instant::now();
    let retrieved = router
        .query(&request.store_dir, &request.session_id, &request.query, request.top_k)
        .await?;

    info!(
        "Vector store query on {} returned {} result(s) in {:.2?}",
        request.store_dir,
        retrieved.results.len(),
        start.elapsed()
    );

    Ok(Json(RetrievalResponse {
        results: retrieved.results,
        context: retrieved.context,
    }))
}
