use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};

use super::error::{ApiError, ApiResult};
use super::response::success;
use super::AppState;
use crate::models::follower::FollowerHistoryQuery;

/// GET /api/data-analytics/followers/accounts
pub async fn list_accounts(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.followers.accounts().await?))
}

/// GET /api/data-analytics/followers/:account_id?limit= - 历史序列（含增量）
pub async fn account_history(
    State(state): State<AppState>,
    Path(account_id): Path<i64>,
    Query(query): Query<FollowerHistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let history = state
        .followers
        .history(account_id, query.limit)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("账号 {} 不存在", account_id)))?;
    Ok(success(history))
}
