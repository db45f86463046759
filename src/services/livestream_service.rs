// 直播记录服务
//
// 列表按月份查询；单日详情附带分P链接、当日歌切和截图。
// 封面优先取直播自身封面，其次当日第一条演唱记录的封面缩略图，最后取第一张截图缩略图。

use chrono::{Datelike, Local, NaiveDate};
use sqlx::{Pool, Sqlite};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::LivestreamConfig;
use crate::database::{livestream_repository, song_repository};
use crate::models::{
    DateValidator, Livestream, LivestreamPayload, LivestreamView, Screenshot, SongCut, ValidationError, Validator,
};
use crate::services::thumbnail::ThumbnailGenerator;

const SCREENSHOT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

#[derive(Debug, Error)]
pub enum LivestreamError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("直播记录不存在: {0}")]
    NotFound(NaiveDate),

    #[error("该日期已有直播记录: {0}")]
    AlreadyExists(NaiveDate),

    #[error("数据库错误: {0}")]
    Database(#[from] anyhow::Error),
}

pub type LivestreamResult<T> = Result<T, LivestreamError>;

#[derive(Clone)]
pub struct LivestreamService {
    pool: Pool<Sqlite>,
    media_root: PathBuf,
    thumbnails: ThumbnailGenerator,
    config: LivestreamConfig,
}

impl LivestreamService {
    pub fn new(pool: Pool<Sqlite>, thumbnails: ThumbnailGenerator, config: LivestreamConfig) -> Self {
        Self {
            pool,
            media_root: thumbnails.media_root().to_path_buf(),
            thumbnails,
            config,
        }
    }

    fn validate_year(&self, year: i32) -> Result<(), ValidationError> {
        DateValidator::validate_year(year, self.config.min_year, self.config.max_year)
    }

    /// 某月的直播列表（日期倒序）；未给年月时取当前月
    pub async fn by_month(&self, year: Option<i32>, month: Option<u32>) -> LivestreamResult<Vec<LivestreamView>> {
        let today = Local::now().date_naive();
        let year = year.unwrap_or(today.year());
        let month = month.unwrap_or(today.month());
        self.validate_year(year)?;
        DateValidator::validate_month(month)?;

        let lives = livestream_repository::list_by_month(&self.pool, year, month).await?;
        debug!("{}-{:02} 共 {} 条直播记录", year, month, lives.len());

        let mut views = Vec::with_capacity(lives.len());
        for live in &lives {
            let cover = self.resolve_cover(live, None).await?;
            views.push(LivestreamView::basic(live, cover));
        }
        Ok(views)
    }

    /// 单日详情；不存在或未启用时返回 `None`
    pub async fn by_date(&self, date: &str) -> LivestreamResult<Option<LivestreamView>> {
        let date = DateValidator::parse_date(date)?;
        self.validate_year(date.year())?;

        let Some(live) = livestream_repository::get_by_date(&self.pool, date)
            .await?
            .filter(|l| l.is_active)
        else {
            return Ok(None);
        };

        let screenshots = self.screenshots(&live).await;
        let cover = self.resolve_cover(&live, Some(&screenshots)).await?;

        let mut view = LivestreamView::basic(&live, cover);
        view.recordings = Some(live.recordings());
        view.song_cuts = Some(self.song_cuts(date).await?);
        view.screenshots = Some(screenshots);
        view.danmaku_cloud_url = Some(live.danmaku_cloud_url.clone());
        Ok(Some(view))
    }

    pub async fn create(&self, payload: &LivestreamPayload) -> LivestreamResult<Livestream> {
        payload.validate()?;
        let raw_date = payload
            .date
            .as_deref()
            .ok_or(ValidationError::Required { field: "date" })?;
        let date = DateValidator::parse_date(raw_date)?;
        self.validate_year(date.year())?;
        let title = payload
            .title
            .as_deref()
            .ok_or(ValidationError::Required { field: "title" })?;

        if livestream_repository::get_by_date(&self.pool, date).await?.is_some() {
            return Err(LivestreamError::AlreadyExists(date));
        }

        let times = Self::times(payload)?;
        let live = livestream_repository::create_livestream(&self.pool, date, title, payload, times).await?;
        info!("创建直播记录: {} {}", live.date, live.title);
        Ok(live)
    }

    pub async fn update(&self, date: &str, payload: &LivestreamPayload) -> LivestreamResult<Livestream> {
        payload.validate()?;
        let date = DateValidator::parse_date(date)?;
        let times = Self::times(payload)?;

        let live = livestream_repository::update_livestream(&self.pool, date, payload, times)
            .await?
            .ok_or(LivestreamError::NotFound(date))?;
        info!("更新直播记录: {}", live.date);
        Ok(live)
    }

    pub async fn delete(&self, date: &str) -> LivestreamResult<()> {
        let date = DateValidator::parse_date(date)?;
        if !livestream_repository::delete_livestream(&self.pool, date).await? {
            return Err(LivestreamError::NotFound(date));
        }
        info!("删除直播记录: {}", date);
        Ok(())
    }

    fn times(
        payload: &LivestreamPayload,
    ) -> Result<(Option<chrono::NaiveTime>, Option<chrono::NaiveTime>), ValidationError> {
        Ok((
            LivestreamPayload::parse_time("start_time", &payload.start_time)?,
            LivestreamPayload::parse_time("end_time", &payload.end_time)?,
        ))
    }

    /// 当日演唱记录（按歌名）
    async fn song_cuts(&self, date: NaiveDate) -> LivestreamResult<Vec<SongCut>> {
        let records = song_repository::records_on_date(&self.pool, date).await?;
        let mut cuts = Vec::with_capacity(records.len());
        for (record, song_name) in records {
            let record = record.with_default_cover();
            let cover = record.cover_url.clone().unwrap_or_default();
            cuts.push(SongCut {
                performed_at: record.performed_at.format("%Y-%m-%d").to_string(),
                song_name,
                url: record.url.unwrap_or_default(),
                cover_thumbnail_url: self.thumbnails.thumbnail_url(&cover).await,
            });
        }
        Ok(cuts)
    }

    async fn resolve_cover(&self, live: &Livestream, screenshots: Option<&[Screenshot]>) -> LivestreamResult<String> {
        if let Some(cover) = live.cover_url.as_deref().filter(|c| !c.is_empty()) {
            return Ok(cover.to_string());
        }

        let first_cover = song_repository::records_on_date(&self.pool, live.date)
            .await?
            .into_iter()
            .next()
            .and_then(|(record, _)| record.cover_url)
            .filter(|c| !c.is_empty());
        if let Some(cover) = first_cover {
            return Ok(self.thumbnails.thumbnail_url(&cover).await);
        }

        let first_shot = match screenshots {
            Some(shots) => shots.first().map(|s| s.thumbnail_url.clone()),
            None => self.screenshots(live).await.into_iter().next().map(|s| s.thumbnail_url),
        };
        Ok(first_shot.unwrap_or_default())
    }

    /// 截图目录下的图片（文件名排序）；目录不存在或路径非法时为空
    async fn screenshots(&self, live: &Livestream) -> Vec<Screenshot> {
        let dir = live.live_moment_dir();
        let relative = dir.trim_matches('/');
        let is_safe = Path::new(relative)
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if relative.is_empty() || !is_safe {
            warn!("截图目录非法: {}", dir);
            return Vec::new();
        }

        let full = self.media_root.join(relative);
        let mut names = Vec::new();
        let mut entries = match tokio::fs::read_dir(&full).await {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_image = Path::new(&name)
                .extension()
                .map(|e| SCREENSHOT_EXTENSIONS.contains(&e.to_string_lossy().to_lowercase().as_str()))
                .unwrap_or(false);
            if is_file && is_image {
                names.push(name);
            }
        }
        names.sort();

        let prefix = format!("/{}/", relative);
        let mut shots = Vec::with_capacity(names.len());
        for name in names {
            let url = format!("{}{}", prefix, name);
            let thumbnail_url = self.thumbnails.thumbnail_url(&url).await;
            shots.push(Screenshot { url, thumbnail_url });
        }
        shots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use tempfile::TempDir;

    async fn service(dir: &TempDir) -> LivestreamService {
        let db = Database::in_memory().await.unwrap();
        LivestreamService::new(
            db.pool().clone(),
            ThumbnailGenerator::new(dir.path()),
            LivestreamConfig::default(),
        )
    }

    fn payload(date: &str) -> LivestreamPayload {
        LivestreamPayload {
            date: Some(date.to_string()),
            title: Some("周末歌会".into()),
            bvid: Some("BV1xx411c7mD".into()),
            parts: Some(2),
            duration_seconds: Some(3700),
            start_time: Some("20:00".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_list_month() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        let live = service.create(&payload("2025-11-30")).await.unwrap();
        assert_eq!(live.duration_formatted, "1h1m40s");

        assert!(matches!(
            service.create(&payload("2025-11-30")).await,
            Err(LivestreamError::AlreadyExists(_))
        ));

        let month = service.by_month(Some(2025), Some(11)).await.unwrap();
        assert_eq!(month.len(), 1);
        assert_eq!(month[0].start_time, "20:00");
        assert!(service.by_month(Some(2025), Some(10)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_year_and_month_bounds() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        assert!(matches!(
            service.by_month(Some(2001), Some(1)).await,
            Err(LivestreamError::Validation(ValidationError::InvalidYear { .. }))
        ));
        assert!(matches!(
            service.by_month(Some(2025), Some(13)).await,
            Err(LivestreamError::Validation(ValidationError::InvalidMonth(13)))
        ));
        assert!(matches!(
            service.by_date("2025-13-01").await,
            Err(LivestreamError::Validation(ValidationError::InvalidDate(_)))
        ));
    }

    #[tokio::test]
    async fn test_detail_includes_screenshots_and_cover_fallback() {
        let dir = TempDir::new().unwrap();
        let shots = dir.path().join("gallery/LiveMoment/2025/11/30");
        std::fs::create_dir_all(&shots).unwrap();
        std::fs::write(shots.join("b.png"), b"not really a png").unwrap();
        std::fs::write(shots.join("a.jpg"), b"not really a jpg").unwrap();
        std::fs::write(shots.join("notes.txt"), b"x").unwrap();

        let service = service(&dir).await;
        service.create(&payload("2025-11-30")).await.unwrap();

        let view = service.by_date("2025-11-30").await.unwrap().unwrap();
        let screenshots = view.screenshots.unwrap();
        assert_eq!(screenshots.len(), 2);
        assert_eq!(screenshots[0].url, "/gallery/LiveMoment/2025/11/30/a.jpg");
        // 无法解码时缩略图回退为原图
        assert_eq!(view.cover_url, "/gallery/LiveMoment/2025/11/30/a.jpg");
        assert_eq!(view.recordings.unwrap().len(), 2);
        assert!(view.song_cuts.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir).await;
        let update = LivestreamPayload { title: Some("新标题".into()), ..Default::default() };
        assert!(matches!(
            service.update("2025-01-01", &update).await,
            Err(LivestreamError::NotFound(_))
        ));
        assert!(matches!(service.delete("2025-01-01").await, Err(LivestreamError::NotFound(_))));

        service.create(&payload("2025-01-01")).await.unwrap();
        let updated = service.update("2025-01-01", &update).await.unwrap();
        assert_eq!(updated.title, "新标题");
        service.delete("2025-01-01").await.unwrap();
        assert!(service.by_date("2025-01-01").await.unwrap().is_none());
    }
}
