use axum::{extract::State, Json};
use std::sync::Arc;

use crate::api::ApiResponse;
use crate::state::AppState;
use super::types::SearchStatus;

/// GET /api/search/status - 搜索索引状态
pub async fn get_search_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SearchStatus>> {
    let manager = &state.index_manager;
    let mut status = SearchStatus::from_report(&state.schema_report);

    // Live values win over the startup report
    status.text_config = manager.text_config().await.or(status.text_config);
    let threshold = manager.similarity_threshold().await;
    status.similarity_threshold = threshold.map(|(value, _)| value);
    status.threshold_scope = threshold.map(|(_, scope)| scope);
    status.verify = manager.verify().await;
    status.strategies = state
        .coordinator
        .strategy_names()
        .into_iter()
        .map(str::to_string)
        .collect();
    status.diagnostics = state.coordinator.diagnostics();

    Json(ApiResponse::success(status))
}
