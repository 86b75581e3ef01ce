use crate::app::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

/// 健康检查处理器 - 没有任何健康实例时返回 503
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let summary = state.load_balancer.health_summary();
    let poller_running = state.load_balancer.is_running().await;

    let (status_code, status) = if summary.is_system_healthy() {
        (StatusCode::OK, "healthy")
    } else if summary.has_available_instances() {
        (StatusCode::OK, "degraded")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "poller_running": poller_running,
            "summary": summary,
        })),
    )
}

/// 注册表快照：每个实例的最新指标、分数和失败计数
pub async fn registry_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.load_balancer.registry_snapshot())
}
