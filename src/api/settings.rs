use axum::{extract::State, response::IntoResponse, Json};
use tracing::info;

use super::error::ApiResult;
use super::response::{created, success};
use super::AppState;
use crate::database::settings_repository;
use crate::models::{
    CreateMilestoneRequest, CreateRecommendationRequest, DateValidator, SiteSettingsView, UpdateSiteSettingsRequest,
    Validator,
};

/// GET /api/site-settings/settings - 未配置时 data 为 null
pub async fn get_settings(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let settings = settings_repository::get_settings(state.database.pool())
        .await?
        .map(SiteSettingsView::from);
    Ok(success(settings))
}

/// GET /api/site-settings/recommendation - 当前启用的推荐语
pub async fn get_recommendation(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(settings_repository::get_active_recommendation(state.database.pool()).await?))
}

pub async fn list_milestones(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(settings_repository::list_milestones(state.database.pool()).await?))
}

/// PUT /api/admin/site-settings
pub async fn update_settings(
    State(state): State<AppState>,
    Json(payload): Json<UpdateSiteSettingsRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    let birthday = payload
        .artist_birthday
        .as_deref()
        .map(DateValidator::parse_date)
        .transpose()?;

    let settings = settings_repository::upsert_settings(state.database.pool(), &payload, birthday).await?;
    info!("网站设置已更新");
    Ok(success(SiteSettingsView::from(settings)))
}

pub async fn create_milestone(
    State(state): State<AppState>,
    Json(payload): Json<CreateMilestoneRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    let date = DateValidator::parse_date(&payload.date)?;
    Ok(created(settings_repository::create_milestone(state.database.pool(), &payload, date).await?))
}

/// POST /api/admin/recommendations
pub async fn create_recommendation(
    State(state): State<AppState>,
    Json(payload): Json<CreateRecommendationRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    Ok(created(settings_repository::create_recommendation(state.database.pool(), &payload).await?))
}
