use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;

use super::error::{ApiError, ApiResult};
use super::response::{paginated, success, Page};
use super::AppState;
use crate::database::song_repository;
use crate::models::{OriginalWorkView, RankingRange, SongListQuery};

#[derive(Debug, Deserialize)]
pub struct RecordsQuery {
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct TopSongsQuery {
    pub range: Option<String>,
    pub limit: Option<i64>,
}

/// GET /api/songs - 歌曲列表（搜索、筛选、排序、分页）
pub async fn list_songs(
    State(state): State<AppState>,
    Query(query): Query<SongListQuery>,
) -> ApiResult<impl IntoResponse> {
    let pool = state.database.pool();
    let total = song_repository::count_songs(pool, &query).await?;
    let page = Page::clamp(query.page, query.page_size(), total);

    let songs = song_repository::list_songs(pool, &query, page.page_size, page.offset()).await?;
    let results = song_repository::attach_meta(pool, songs).await?;

    Ok(paginated(results, total, page))
}

/// GET /api/songs/:id
pub async fn get_song(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.songs.detail(id).await?))
}

/// GET /api/songs/:id/records - 演唱记录（新的在前）
pub async fn get_song_records(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<RecordsQuery>,
) -> ApiResult<impl IntoResponse> {
    let records = state.songs.records(id, query.page, query.page_size).await?;
    Ok(success(records))
}

pub async fn list_styles(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.songs.styles().await?))
}

pub async fn list_tags(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.songs.tags().await?))
}

pub async fn list_languages(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.songs.languages().await?))
}

/// GET /api/top-songs?range=all|1m|3m|1y|10d|20d|30d&limit=
pub async fn top_songs(
    State(state): State<AppState>,
    Query(query): Query<TopSongsQuery>,
) -> ApiResult<impl IntoResponse> {
    let range = RankingRange::parse(query.range.as_deref());
    Ok(success(state.songs.top_songs(range, query.limit).await?))
}

pub async fn random_song(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let song = state
        .songs
        .random()
        .await?
        .ok_or_else(|| ApiError::NotFound("暂无歌曲".to_string()))?;
    Ok(success(song))
}

/// GET /api/original-works - 原创作品（精选优先）
pub async fn original_works(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let works: Vec<OriginalWorkView> = song_repository::list_original_works(state.database.pool())
        .await?
        .into_iter()
        .map(OriginalWorkView::from)
        .collect();
    Ok(success(works))
}
