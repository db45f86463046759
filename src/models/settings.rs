use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::validation::{DateValidator, StringValidator, ValidationError, Validator};

/// 网站设置（单行）
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SiteSettings {
    pub id: i64,
    pub favicon: Option<String>,
    pub artist_name: String,
    pub artist_avatar: Option<String>,
    pub artist_birthday: Option<NaiveDate>,
    pub artist_constellation: String,
    pub artist_location: String,
    pub artist_profession: String,     // JSON array as string
    pub artist_voice_features: String, // JSON array as string
    pub bilibili_url: String,
    pub weibo_url: String,
    pub netease_music_url: String,
    pub youtube_url: String,
    pub qq_music_url: String,
    pub xiaohongshu_url: String,
    pub douyin_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SocialLinks {
    pub bilibili: String,
    pub weibo: String,
    pub netease_music: String,
    pub youtube: String,
    pub qq_music: String,
    pub xiaohongshu: String,
    pub douyin: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteSettingsView {
    pub favicon: Option<String>,
    pub artist_name: String,
    pub artist_avatar: Option<String>,
    pub artist_birthday: Option<NaiveDate>,
    pub artist_constellation: String,
    pub artist_location: String,
    pub artist_profession: Vec<String>,
    pub artist_voice_features: Vec<String>,
    pub social_links: SocialLinks,
    pub updated_at: DateTime<Utc>,
}

impl From<SiteSettings> for SiteSettingsView {
    fn from(s: SiteSettings) -> Self {
        Self {
            favicon: s.favicon,
            artist_name: s.artist_name,
            artist_avatar: s.artist_avatar,
            artist_birthday: s.artist_birthday,
            artist_constellation: s.artist_constellation,
            artist_location: s.artist_location,
            artist_profession: serde_json::from_str(&s.artist_profession).unwrap_or_default(),
            artist_voice_features: serde_json::from_str(&s.artist_voice_features).unwrap_or_default(),
            social_links: SocialLinks {
                bilibili: s.bilibili_url,
                weibo: s.weibo_url,
                netease_music: s.netease_music_url,
                youtube: s.youtube_url,
                qq_music: s.qq_music_url,
                xiaohongshu: s.xiaohongshu_url,
                douyin: s.douyin_url,
            },
            updated_at: s.updated_at,
        }
    }
}

/// 部分更新，未提供的字段保持不变
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSiteSettingsRequest {
    pub favicon: Option<String>,
    pub artist_name: Option<String>,
    pub artist_avatar: Option<String>,
    pub artist_birthday: Option<String>,
    pub artist_constellation: Option<String>,
    pub artist_location: Option<String>,
    pub artist_profession: Option<Vec<String>>,
    pub artist_voice_features: Option<Vec<String>>,
    pub bilibili_url: Option<String>,
    pub weibo_url: Option<String>,
    pub netease_music_url: Option<String>,
    pub youtube_url: Option<String>,
    pub qq_music_url: Option<String>,
    pub xiaohongshu_url: Option<String>,
    pub douyin_url: Option<String>,
}

impl Validator for UpdateSiteSettingsRequest {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if let Some(ref birthday) = self.artist_birthday {
            DateValidator::parse_date(birthday)?;
        }
        for url in [
            &self.bilibili_url,
            &self.weibo_url,
            &self.netease_music_url,
            &self.youtube_url,
            &self.qq_music_url,
            &self.xiaohongshu_url,
            &self.douyin_url,
        ] {
            StringValidator::validate_url(url)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recommendation {
    pub id: i64,
    pub content: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendedSong {
    pub id: i64,
    pub song_name: String,
    pub singer: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecommendationView {
    pub id: i64,
    pub content: String,
    pub is_active: bool,
    pub recommended_songs_details: Vec<RecommendedSong>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRecommendationRequest {
    pub content: String,
    #[serde(default)]
    pub recommended_songs: Vec<i64>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Validator for CreateRecommendationRequest {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        StringValidator::validate_required("content", &self.content)
    }
}

/// 里程碑
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Milestone {
    pub id: i64,
    pub date: NaiveDate,
    pub title: String,
    pub description: String,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMilestoneRequest {
    pub date: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub display_order: i64,
}

impl Validator for CreateMilestoneRequest {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        DateValidator::parse_date(&self.date)?;
        StringValidator::validate_title(&self.title)?;
        StringValidator::validate_required("description", &self.description)?;
        Ok(())
    }
}
