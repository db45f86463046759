use chrono::{Duration, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use thiserror::Error;
use tracing::info;

use crate::database::song_repository;
use crate::models::{
    BatchTagRequest, CreateRecordRequest, CreateSongRequest, MergeResult, MergeSongsRequest, RankingRange, SongRecord,
    SongView, TopSong, ValidationError, Validator,
};
use crate::services::api_cache::{ApiCache, CacheKind};

pub const DEFAULT_TOP_LIMIT: i64 = 10;
pub const MAX_TOP_LIMIT: i64 = 100;
pub const DEFAULT_RECORD_PAGE_SIZE: i64 = 20;
pub const MAX_RECORD_PAGE_SIZE: i64 = 100;

#[derive(Debug, Error)]
pub enum SongError {
    #[error("歌曲不存在: {0}")]
    SongNotFound(i64),

    #[error("演唱记录不存在: {0}")]
    RecordNotFound(i64),

    #[error("合并参数无效: {0}")]
    InvalidMerge(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("数据库错误: {0}")]
    Database(#[from] anyhow::Error),
}

pub type SongResult<T> = Result<T, SongError>;

/// 分页后的演唱记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPage {
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub results: Vec<SongRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchTagResult {
    pub songs: usize,
    pub tags_added: u64,
    pub styles_added: u64,
}

/// 歌曲读写；读接口走缓存，写操作后清空缓存
#[derive(Clone)]
pub struct SongService {
    pool: Pool<Sqlite>,
    cache: ApiCache,
}

impl SongService {
    pub fn new(pool: Pool<Sqlite>, cache: ApiCache) -> Self {
        Self { pool, cache }
    }

    pub fn cache(&self) -> &ApiCache {
        &self.cache
    }

    pub async fn detail(&self, id: i64) -> SongResult<SongView> {
        let pool = self.pool.clone();
        let view: Option<SongView> = self
            .cache
            .get_or_load(CacheKind::SongDetail, &id.to_string(), || async move {
                let Some(song) = song_repository::get_song(&pool, id).await? else {
                    return Ok::<_, anyhow::Error>(None);
                };
                Ok(song_repository::attach_meta(&pool, vec![song]).await?.pop())
            })
            .await?;
        view.ok_or(SongError::SongNotFound(id))
    }

    /// 某首歌的演唱记录（新的在前），页码越界时钳到有效范围
    pub async fn records(&self, song_id: i64, page: Option<i64>, page_size: Option<i64>) -> SongResult<RecordPage> {
        if song_repository::get_song(&self.pool, song_id).await?.is_none() {
            return Err(SongError::SongNotFound(song_id));
        }

        let page_size = page_size
            .unwrap_or(DEFAULT_RECORD_PAGE_SIZE)
            .clamp(1, MAX_RECORD_PAGE_SIZE);
        let suffix = format!("{}:{}:{}", song_id, page.unwrap_or(1), page_size);
        let pool = self.pool.clone();

        let records = self
            .cache
            .get_or_load(CacheKind::SongRecords, &suffix, || async move {
                let total = song_repository::count_records(&pool, song_id).await?;
                let num_pages = ((total + page_size - 1) / page_size).max(1);
                let page = match page {
                    Some(p) if p >= 1 => p.min(num_pages),
                    _ => 1,
                };
                let results = song_repository::list_records(&pool, song_id, page_size, (page - 1) * page_size)
                    .await?
                    .into_iter()
                    .map(SongRecord::with_default_cover)
                    .collect();
                Ok::<_, anyhow::Error>(RecordPage { total, page, page_size, results })
            })
            .await?;
        Ok(records)
    }

    /// 排行榜；`range` 未知时按全部时间统计
    pub async fn top_songs(&self, range: RankingRange, limit: Option<i64>) -> SongResult<Vec<TopSong>> {
        let limit = limit.unwrap_or(DEFAULT_TOP_LIMIT).clamp(1, MAX_TOP_LIMIT);
        let since = range
            .days()
            .map(|days| Local::now().date_naive() - Duration::days(days));
        let suffix = format!("{}:{}", range.as_str(), limit);
        let pool = self.pool.clone();

        let top = self
            .cache
            .get_or_load(CacheKind::TopSongs, &suffix, || async move {
                song_repository::top_songs(&pool, since, limit).await
            })
            .await?;
        Ok(top)
    }

    pub async fn styles(&self) -> SongResult<Vec<String>> {
        let pool = self.pool.clone();
        Ok(self
            .cache
            .get_or_load(CacheKind::Styles, "", || async move { song_repository::list_style_names(&pool).await })
            .await?)
    }

    pub async fn tags(&self) -> SongResult<Vec<String>> {
        let pool = self.pool.clone();
        Ok(self
            .cache
            .get_or_load(CacheKind::Tags, "", || async move { song_repository::list_tag_names(&pool).await })
            .await?)
    }

    pub async fn languages(&self) -> SongResult<Vec<String>> {
        let pool = self.pool.clone();
        Ok(self
            .cache
            .get_or_load(CacheKind::Languages, "", || async move { song_repository::list_languages(&pool).await })
            .await?)
    }

    pub async fn random(&self) -> SongResult<Option<SongView>> {
        let Some(song) = song_repository::random_song(&self.pool).await? else {
            return Ok(None);
        };
        Ok(song_repository::attach_meta(&self.pool, vec![song]).await?.pop())
    }

    pub async fn create_song(&self, req: &CreateSongRequest) -> SongResult<SongView> {
        req.validate()?;

        let song = song_repository::create_song(
            &self.pool,
            req.song_name.trim(),
            req.singer.as_deref().map(str::trim).filter(|s| !s.is_empty()),
            req.language.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        )
        .await?;

        for style in req.styles.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            let style_id = song_repository::ensure_style(&self.pool, style).await?;
            song_repository::add_style(&self.pool, song.id, style_id).await?;
        }
        for tag in req.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            let tag_id = song_repository::ensure_tag(&self.pool, tag).await?;
            song_repository::add_tag(&self.pool, song.id, tag_id).await?;
        }

        info!("创建歌曲: {} (ID: {})", song.song_name, song.id);
        self.cache.clear().await;
        self.detail(song.id).await
    }

    /// 新增演唱记录；未给封面时使用日期封面路径
    pub async fn create_record(&self, req: &CreateRecordRequest) -> SongResult<SongRecord> {
        req.validate()?;
        let performed_at: NaiveDate = req.performed_date()?;

        if song_repository::get_song(&self.pool, req.song_id).await?.is_none() {
            return Err(SongError::SongNotFound(req.song_id));
        }

        let record = song_repository::create_record(
            &self.pool,
            req.song_id,
            performed_at,
            req.url.as_deref().filter(|u| !u.is_empty()),
            req.notes.as_deref().filter(|n| !n.is_empty()),
            req.cover_url.as_deref().filter(|c| !c.is_empty()),
        )
        .await?;

        self.cache.clear().await;
        Ok(record.with_default_cover())
    }

    pub async fn delete_record(&self, id: i64) -> SongResult<SongRecord> {
        let record = song_repository::delete_record(&self.pool, id)
            .await?
            .ok_or(SongError::RecordNotFound(id))?;
        info!("删除演唱记录 {} (歌曲 {})", id, record.song_id);
        self.cache.clear().await;
        Ok(record)
    }

    /// 合并歌曲，源歌曲的记录、曲风、标签并入目标后删除
    pub async fn merge(&self, req: &MergeSongsRequest) -> SongResult<MergeResult> {
        let mut sources: Vec<i64> = req
            .source_ids
            .iter()
            .copied()
            .filter(|&id| id != req.target_id)
            .collect();
        sources.sort_unstable();
        sources.dedup();

        if sources.is_empty() {
            return Err(SongError::InvalidMerge("至少需要一首与目标不同的源歌曲".to_string()));
        }
        if song_repository::get_song(&self.pool, req.target_id).await?.is_none() {
            return Err(SongError::SongNotFound(req.target_id));
        }
        for &id in &sources {
            if song_repository::get_song(&self.pool, id).await?.is_none() {
                return Err(SongError::SongNotFound(id));
            }
        }

        let moved_records = song_repository::merge_songs(&self.pool, req.target_id, &sources).await?;
        let target = song_repository::get_song(&self.pool, req.target_id)
            .await?
            .ok_or(SongError::SongNotFound(req.target_id))?;

        info!(
            "合并歌曲: {:?} -> {}，迁移记录 {} 条",
            sources, req.target_id, moved_records
        );
        self.cache.clear().await;

        Ok(MergeResult {
            target_id: target.id,
            merged_songs: sources.len(),
            moved_records,
            perform_count: target.perform_count,
        })
    }

    /// 批量为歌曲添加标签与曲风，已有的关联忽略
    pub async fn batch_tag(&self, req: &BatchTagRequest) -> SongResult<BatchTagResult> {
        let mut tag_ids = Vec::new();
        for tag in req.tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            tag_ids.push(song_repository::ensure_tag(&self.pool, tag).await?);
        }
        let mut style_ids = Vec::new();
        for style in req.styles.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            style_ids.push(song_repository::ensure_style(&self.pool, style).await?);
        }

        let mut result = BatchTagResult { songs: 0, tags_added: 0, styles_added: 0 };
        for &song_id in &req.song_ids {
            if song_repository::get_song(&self.pool, song_id).await?.is_none() {
                return Err(SongError::SongNotFound(song_id));
            }
            for &tag_id in &tag_ids {
                result.tags_added += song_repository::add_tag(&self.pool, song_id, tag_id).await?;
            }
            for &style_id in &style_ids {
                result.styles_added += song_repository::add_style(&self.pool, song_id, style_id).await?;
            }
            result.songs += 1;
        }

        self.cache.clear().await;
        Ok(result)
    }

    pub async fn rebuild_stats(&self) -> SongResult<u64> {
        let updated = song_repository::rebuild_all_song_stats(&self.pool).await?;
        self.cache.clear().await;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;

    async fn service() -> SongService {
        let db = Database::in_memory().await.unwrap();
        SongService::new(db.pool().clone(), ApiCache::new(100))
    }

    fn record(song_id: i64, date: &str) -> CreateRecordRequest {
        CreateRecordRequest {
            song_id,
            performed_at: date.to_string(),
            url: None,
            notes: None,
            cover_url: None,
        }
    }

    fn song(name: &str) -> CreateSongRequest {
        CreateSongRequest {
            song_name: name.to_string(),
            singer: Some("周杰伦".into()),
            language: Some("国语".into()),
            styles: vec!["流行".into()],
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn test_record_updates_stats_and_invalidates_cache() {
        let service = service().await;
        let created = service.create_song(&song("晴天")).await.unwrap();
        assert_eq!(created.styles, vec!["流行".to_string()]);

        let before = service.detail(created.song.id).await.unwrap();
        assert_eq!(before.song.perform_count, 0);

        let rec = service.create_record(&record(created.song.id, "2025-06-12")).await.unwrap();
        assert_eq!(rec.cover_url.as_deref(), Some("/covers/2025/06/2025-06-12.jpg"));

        let after = service.detail(created.song.id).await.unwrap();
        assert_eq!(after.song.perform_count, 1);
        assert_eq!(after.song.last_performed, NaiveDate::from_ymd_opt(2025, 6, 12));
    }

    #[tokio::test]
    async fn test_record_for_missing_song() {
        let service = service().await;
        assert!(matches!(
            service.create_record(&record(999, "2025-06-12")).await,
            Err(SongError::SongNotFound(999))
        ));
        assert!(matches!(
            service.create_record(&record(1, "2025/06/12")).await,
            Err(SongError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_moves_records() {
        let service = service().await;
        let a = service.create_song(&song("夜曲")).await.unwrap().song.id;
        let b = service.create_song(&song("夜曲 ")).await.unwrap().song.id;
        service.create_record(&record(a, "2025-01-01")).await.unwrap();
        service.create_record(&record(b, "2025-02-01")).await.unwrap();

        let result = service
            .merge(&MergeSongsRequest { target_id: a, source_ids: vec![b, a] })
            .await
            .unwrap();
        assert_eq!(result.merged_songs, 1);
        assert_eq!(result.moved_records, 1);
        assert_eq!(result.perform_count, 2);
        assert!(matches!(service.detail(b).await, Err(SongError::SongNotFound(_))));

        assert!(matches!(
            service.merge(&MergeSongsRequest { target_id: a, source_ids: vec![a] }).await,
            Err(SongError::InvalidMerge(_))
        ));
    }

    #[tokio::test]
    async fn test_records_page_is_clamped() {
        let service = service().await;
        let id = service.create_song(&song("稻香")).await.unwrap().song.id;
        for day in 1..=3 {
            service.create_record(&record(id, &format!("2025-03-0{}", day))).await.unwrap();
        }
        let page = service.records(id, Some(9), Some(2)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.page, 2);
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].performed_at, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
    }

    #[tokio::test]
    async fn test_batch_tag_is_idempotent() {
        let service = service().await;
        let id = service.create_song(&song("七里香")).await.unwrap().song.id;
        let req = BatchTagRequest { song_ids: vec![id], tags: vec!["经典".into()], styles: vec![] };

        assert_eq!(service.batch_tag(&req).await.unwrap().tags_added, 1);
        assert_eq!(service.batch_tag(&req).await.unwrap().tags_added, 0);
        assert_eq!(service.tags().await.unwrap(), vec!["经典".to_string()]);
    }
}
