use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::validation::{DateValidator, StringValidator, ValidationError, Validator};

/// 歌曲
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Song {
    pub id: i64,
    pub song_name: String,
    pub singer: Option<String>,
    pub first_perform: Option<NaiveDate>,
    pub last_performed: Option<NaiveDate>,
    pub perform_count: i64,
    pub language: Option<String>,
}

/// 带曲风、标签的歌曲（列表与详情接口）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SongView {
    #[serde(flatten)]
    pub song: Song,
    pub styles: Vec<String>,
    pub tags: Vec<String>,
}

/// 演唱记录
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SongRecord {
    pub id: i64,
    pub song_id: i64,
    pub performed_at: NaiveDate,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub cover_url: Option<String>,
}

impl SongRecord {
    /// 未设置封面时按日期推导 `/covers/YYYY/MM/YYYY-MM-DD.jpg`
    pub fn with_default_cover(mut self) -> Self {
        if self.cover_url.as_deref().map_or(true, str::is_empty) {
            self.cover_url = Some(default_cover_path(self.performed_at));
        }
        self
    }
}

pub fn default_cover_path(date: NaiveDate) -> String {
    format!(
        "/covers/{:04}/{:02}/{}.jpg",
        date.year(),
        date.month(),
        date.format("%Y-%m-%d")
    )
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Style {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// 原创作品
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OriginalWork {
    pub id: i64,
    pub title: String,
    pub release_date: NaiveDate,
    pub description: Option<String>,
    pub cover: Option<String>,
    pub netease_id: Option<String>,
    pub bilibili_bvid: Option<String>,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 前端使用的原创作品结构
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalWorkView {
    pub id: i64,
    pub title: String,
    pub date: String,
    pub desc: String,
    pub cover: Option<String>,
    pub netease_id: Option<String>,
    pub bilibili_bvid: Option<String>,
    pub featured: bool,
}

impl From<OriginalWork> for OriginalWorkView {
    fn from(w: OriginalWork) -> Self {
        Self {
            id: w.id,
            title: w.title,
            date: w.release_date.format("%Y.%m.%d").to_string(),
            desc: w.description.unwrap_or_default(),
            cover: w.cover,
            netease_id: w.netease_id,
            bilibili_bvid: w.bilibili_bvid,
            featured: w.featured,
        }
    }
}

/// 排行榜条目
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TopSong {
    pub id: i64,
    pub song_name: String,
    pub singer: Option<String>,
    pub perform_count: i64,
    pub first_perform: Option<NaiveDate>,
    pub last_performed: Option<NaiveDate>,
}

/// 排行时间范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankingRange {
    #[serde(rename = "all")]
    All,
    #[serde(rename = "1m")]
    OneMonth,
    #[serde(rename = "3m")]
    ThreeMonths,
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "10d")]
    TenDays,
    #[serde(rename = "20d")]
    TwentyDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl RankingRange {
    /// 未知取值按 `all` 处理
    pub fn parse(value: Option<&str>) -> Self {
        match value.unwrap_or("all") {
            "1m" => RankingRange::OneMonth,
            "3m" => RankingRange::ThreeMonths,
            "1y" => RankingRange::OneYear,
            "10d" => RankingRange::TenDays,
            "20d" => RankingRange::TwentyDays,
            "30d" => RankingRange::ThirtyDays,
            _ => RankingRange::All,
        }
    }

    pub fn days(&self) -> Option<i64> {
        match self {
            RankingRange::All => None,
            RankingRange::OneMonth | RankingRange::ThirtyDays => Some(30),
            RankingRange::ThreeMonths => Some(90),
            RankingRange::OneYear => Some(365),
            RankingRange::TenDays => Some(10),
            RankingRange::TwentyDays => Some(20),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RankingRange::All => "all",
            RankingRange::OneMonth => "1m",
            RankingRange::ThreeMonths => "3m",
            RankingRange::OneYear => "1y",
            RankingRange::TenDays => "10d",
            RankingRange::TwentyDays => "20d",
            RankingRange::ThirtyDays => "30d",
        }
    }
}

/// 歌曲列表查询参数
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SongListQuery {
    pub q: Option<String>,
    pub language: Option<String>,
    pub styles: Option<String>,
    pub tags: Option<String>,
    pub ordering: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl SongListQuery {
    pub const MAX_LIMIT: i64 = 50;

    pub fn page_size(&self) -> i64 {
        self.limit.unwrap_or(Self::MAX_LIMIT).clamp(1, Self::MAX_LIMIT)
    }

    pub fn language_list(&self) -> Vec<String> {
        split_csv(self.language.as_deref())
    }

    pub fn style_list(&self) -> Vec<String> {
        split_csv(self.styles.as_deref())
    }

    pub fn tag_list(&self) -> Vec<String> {
        split_csv(self.tags.as_deref())
    }

    pub fn cache_key(&self) -> String {
        format!(
            "song_list:{}:{}:{}:{}:{}:{}:{}",
            self.q.as_deref().unwrap_or(""),
            self.page.unwrap_or(1),
            self.page_size(),
            self.ordering.as_deref().unwrap_or(""),
            self.style_list().join("-"),
            self.tag_list().join("-"),
            self.language_list().join("-"),
        )
    }
}

fn split_csv(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSongRequest {
    pub song_name: String,
    pub singer: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Validator for CreateSongRequest {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        StringValidator::validate_required("song_name", &self.song_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecordRequest {
    pub song_id: i64,
    pub performed_at: String,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub cover_url: Option<String>,
}

impl CreateRecordRequest {
    pub fn performed_date(&self) -> Result<NaiveDate, ValidationError> {
        DateValidator::parse_date(&self.performed_at)
    }
}

impl Validator for CreateRecordRequest {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        self.performed_date()?;
        StringValidator::validate_url(&self.url)?;
        StringValidator::validate_notes(&self.notes)?;
        Ok(())
    }
}

/// 合并歌曲：把 `source_ids` 的记录、曲风、标签并入 `target_id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSongsRequest {
    pub target_id: i64,
    pub source_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchTagRequest {
    pub song_ids: Vec<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MergeResult {
    pub target_id: i64,
    pub merged_songs: usize,
    pub moved_records: u64,
    pub perform_count: i64,
}
