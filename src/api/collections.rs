use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::response::{created, paginated, success, success_message, Page};
use super::AppState;
use crate::database::diy_repository;
use crate::models::{CreateCollectionRequest, CreateWorkRequest, Validator, WorkListQuery, WorkView};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct CollectionListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

fn page_size(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

/// GET /api/fansdiy/collections
pub async fn list_collections(
    State(state): State<AppState>,
    Query(query): Query<CollectionListQuery>,
) -> ApiResult<impl IntoResponse> {
    let pool = state.database.pool();
    let total = diy_repository::count_collections(pool).await?;
    let page = Page::clamp(query.page, page_size(query.limit), total);

    let collections = diy_repository::list_collections(pool, page.page_size, page.offset()).await?;
    Ok(paginated(collections, total, page))
}

pub async fn get_collection(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<impl IntoResponse> {
    let collection = diy_repository::get_collection(state.database.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("合集ID {} 不存在", id)))?;
    Ok(success(collection))
}

/// GET /api/fansdiy/works?collection= - 作品列表，可按合集筛选
pub async fn list_works(
    State(state): State<AppState>,
    Query(query): Query<WorkListQuery>,
) -> ApiResult<impl IntoResponse> {
    let pool = state.database.pool();
    let total = diy_repository::count_works(pool, query.collection).await?;
    let page = Page::clamp(query.page, page_size(query.limit), total);

    let works: Vec<WorkView> = diy_repository::list_works(pool, query.collection, page.page_size, page.offset())
        .await?
        .into_iter()
        .map(WorkView::from)
        .collect();
    Ok(paginated(works, total, page))
}

pub async fn get_work(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<impl IntoResponse> {
    let work = diy_repository::get_work(state.database.pool(), id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("作品ID {} 不存在", id)))?;
    Ok(success(WorkView::from(work)))
}

/// POST /api/admin/fansdiy/collections
pub async fn create_collection(
    State(state): State<AppState>,
    Json(payload): Json<CreateCollectionRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    let collection = diy_repository::create_collection(state.database.pool(), &payload).await?;
    info!("创建合集: {} ({})", collection.name, collection.id);
    Ok(created(collection))
}

/// POST /api/admin/fansdiy/works - 合集必须存在
pub async fn create_work(
    State(state): State<AppState>,
    Json(payload): Json<CreateWorkRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    let pool = state.database.pool();
    if diy_repository::get_collection(pool, payload.collection_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("合集ID {} 不存在", payload.collection_id)));
    }

    let work = diy_repository::create_work(pool, &payload).await?;
    Ok(created(WorkView::from(work)))
}

pub async fn delete_work(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<impl IntoResponse> {
    if !diy_repository::delete_work(state.database.pool(), id).await? {
        return Err(ApiError::NotFound(format!("作品ID {} 不存在", id)));
    }
    Ok(success_message("作品已删除"))
}
