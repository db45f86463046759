use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::response::{created, success, success_message};
use super::AppState;
use crate::models::{BatchTagRequest, CreateRecordRequest, CreateSongRequest, MergeSongsRequest, StringValidator};
use crate::services::bilibili_importer::{PendingPart, SelectedSong};

/// 冲突选择：歌曲 ID 或 `"__new__"`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SelectedSongId {
    Id(i64),
    Text(String),
}

impl SelectedSongId {
    fn resolve(&self) -> Option<SelectedSong> {
        match self {
            SelectedSongId::Id(id) => Some(SelectedSong::Existing(*id)),
            SelectedSongId::Text(raw) => SelectedSong::parse(raw),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportBvRequest {
    pub bvid: String,
    pub selected_song_id: Option<SelectedSongId>,
    pub pending_parts: Option<Vec<PendingPart>>,
}

/// POST /api/admin/songs
pub async fn create_song(
    State(state): State<AppState>,
    Json(payload): Json<CreateSongRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(created(state.songs.create_song(&payload).await?))
}

/// POST /api/admin/songs/merge
pub async fn merge_songs(
    State(state): State<AppState>,
    Json(payload): Json<MergeSongsRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(state.songs.merge(&payload).await?))
}

/// POST /api/admin/songs/batch-tag
pub async fn batch_tag(
    State(state): State<AppState>,
    Json(payload): Json<BatchTagRequest>,
) -> ApiResult<impl IntoResponse> {
    if payload.song_ids.is_empty() {
        return Err(ApiError::field("song_ids", "请选择歌曲"));
    }
    if payload.tags.is_empty() && payload.styles.is_empty() {
        return Err(ApiError::field("tags", "标签和曲风不能同时为空"));
    }
    Ok(success(state.songs.batch_tag(&payload).await?))
}

/// POST /api/admin/records
pub async fn create_record(
    State(state): State<AppState>,
    Json(payload): Json<CreateRecordRequest>,
) -> ApiResult<impl IntoResponse> {
    Ok(created(state.songs.create_record(&payload).await?))
}

/// DELETE /api/admin/records/:id
pub async fn delete_record(State(state): State<AppState>, Path(id): Path<i64>) -> ApiResult<impl IntoResponse> {
    state.songs.delete_record(id).await?;
    Ok(success_message("演唱记录已删除"))
}

/// POST /api/admin/import-bv - 按BV号导入演唱记录
///
/// B站接口错误写在 `error` 字段中，同名冲突写在 `conflict` 字段中，均以 200 返回。
pub async fn import_bv(
    State(state): State<AppState>,
    Json(payload): Json<ImportBvRequest>,
) -> ApiResult<impl IntoResponse> {
    let bvid = payload.bvid.trim();
    StringValidator::validate_bvid(bvid)?;

    let selected = match &payload.selected_song_id {
        Some(raw) => Some(
            raw.resolve()
                .ok_or_else(|| ApiError::field("selected_song_id", "无效的歌曲选择"))?,
        ),
        None => None,
    };
    if selected.is_some() && payload.pending_parts.as_ref().map_or(true, |p| p.is_empty()) {
        return Err(ApiError::field("pending_parts", "选择歌曲时必须提供待处理分P"));
    }

    let outcome = state.importer.import_bv(bvid, selected, payload.pending_parts).await?;
    if !outcome.results.is_empty() {
        state.cache.clear().await;
    }
    Ok(success(outcome))
}

/// POST /api/admin/cache/clear
pub async fn clear_cache(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.cache.clear().await;
    info!("接口缓存已清空");
    Ok(success_message("缓存已清空"))
}
