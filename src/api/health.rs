use axum::{extract::State, response::IntoResponse};
use serde_json::json;

use super::error::{ApiError, ApiResult};
use super::response::success;
use super::AppState;

/// 健康检查端点
pub async fn health_check(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    // 检查数据库连接
    state.database.verify_integrity().await.map_err(|e| {
        tracing::error!("Health check failed: {}", e);
        ApiError::Internal("Database connection failed".to_string())
    })?;

    let stats = state
        .database
        .get_stats()
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to get database stats: {}", e)))?;

    Ok(success(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "database": "connected",
        "stats": {
            "song_count": stats.song_count,
            "record_count": stats.record_count,
            "gallery_count": stats.gallery_count,
            "livestream_count": stats.livestream_count,
            "database_size_mb": stats.database_size_mb(),
        },
        "cache_entries": state.cache.entry_count(),
    })))
}
