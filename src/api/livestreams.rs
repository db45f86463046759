use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};

use super::error::{ApiError, ApiResult};
use super::response::{created, success, success_message};
use super::AppState;
use crate::models::livestream::LivestreamMonthQuery;
use crate::models::LivestreamPayload;

/// GET /api/livestreams?year=&month= - 按月列出（缺省为当月）
pub async fn list_livestreams(
    State(state): State<AppState>,
    Query(query): Query<LivestreamMonthQuery>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.livestreams.by_month(query.year, query.month).await?))
}

/// GET /api/livestreams/:date - 单日详情（含分段、歌切、截图）
pub async fn get_livestream(State(state): State<AppState>, Path(date): Path<String>) -> ApiResult<impl IntoResponse> {
    let view = state
        .livestreams
        .by_date(&date)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} 没有直播记录", date)))?;
    Ok(success(view))
}

pub async fn create_livestream(
    State(state): State<AppState>,
    Json(payload): Json<LivestreamPayload>,
) -> ApiResult<impl IntoResponse> {
    Ok(created(state.livestreams.create(&payload).await?))
}

pub async fn update_livestream(
    State(state): State<AppState>,
    Path(date): Path<String>,
    Json(payload): Json<LivestreamPayload>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.livestreams.update(&date, &payload).await?))
}

pub async fn delete_livestream(State(state): State<AppState>, Path(date): Path<String>) -> ApiResult<impl IntoResponse> {
    state.livestreams.delete(&date).await?;
    Ok(success_message("直播记录已删除"))
}
