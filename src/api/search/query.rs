use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use docvault_search::search::{self as engine, SearchContext, SearchResult};

use crate::api::ApiResponse;
use crate::state::AppState;
use super::types::{require_user, ApiError, SearchParams};

/// POST /api/search - 搜索文档
///
/// Never fails on query problems: they show up as an empty page and in
/// the diagnostics of /api/search/status.
pub async fn search(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(params): Json<SearchParams>,
) -> Result<Json<ApiResponse<SearchResult>>, ApiError> {
    let user_id = require_user(&headers)?;
    let (request, timeout) = {
        let config = state.config.read();
        (
            params.into_request(user_id, &config.search),
            config.search.query_timeout(),
        )
    };

    // Dropping the handler (client went away) cancels the running query
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();
    let ctx = SearchContext::new().with_timeout(timeout).with_cancel(cancel);

    let request_id = Uuid::new_v4();
    tracing::debug!(%request_id, user = %request.user_id, query = %request.query, "search");
    let result = state.coordinator.search(&ctx, &request).await;
    tracing::debug!(%request_id, total = result.total, "search done");

    Ok(Json(ApiResponse::success(result)))
}

/// GET /api/documents - 文档列表
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Result<Json<ApiResponse<SearchResult>>, ApiError> {
    let user_id = require_user(&headers)?;
    let request = {
        let config = state.config.read();
        params.into_request(user_id, &config.search)
    };

    match engine::list_documents(&state.db, &request).await {
        Ok(result) => Ok(Json(ApiResponse::success(result))),
        Err(e) => {
            tracing::error!("Document listing failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::error(500, "failed to list documents")),
            ))
        }
    }
}
