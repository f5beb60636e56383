use axum::Json;
use serde_json::{json, Value};

/// GET /api/health - 健康检查
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "docvault search is running",
        "build_time": env!("BUILD_TIME"),
    }))
}
