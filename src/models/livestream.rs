use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::validation::{DateValidator, StringValidator, ValidationError, Validator};

/// 直播记录
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Livestream {
    pub id: i64,
    pub date: NaiveDate,
    pub title: String,
    pub summary: String,
    pub bvid: Option<String>,
    pub duration_seconds: Option<i64>,
    pub duration_formatted: String,
    pub parts: i64,
    /// 截图目录，如 `/gallery/LiveMoment/2025/11/30/`
    pub live_moment: String,
    pub cover_url: Option<String>,
    pub view_count: String,
    pub danmaku_count: String,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub danmaku_cloud_url: String,
    pub is_active: bool,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Livestream {
    pub fn bilibili_url(&self) -> String {
        match self.bvid.as_deref() {
            Some(bvid) if !bvid.is_empty() => format!("https://www.bilibili.com/video/{}", bvid),
            _ => String::new(),
        }
    }

    /// 分P播放链接
    pub fn recordings(&self) -> Vec<Recording> {
        let Some(bvid) = self.bvid.as_deref().filter(|b| !b.is_empty()) else {
            return Vec::new();
        };

        if self.parts <= 1 {
            return vec![Recording {
                title: self.title.clone(),
                url: format!("https://www.bilibili.com/video/{}", bvid),
            }];
        }

        (1..=self.parts)
            .map(|i| Recording {
                title: format!("{} - P{}", self.title, i),
                url: format!("https://www.bilibili.com/video/{}?p={}", bvid, i),
            })
            .collect()
    }

    /// 未设置时按日期推导截图目录
    pub fn live_moment_dir(&self) -> String {
        if !self.live_moment.is_empty() {
            return self.live_moment.clone();
        }
        format!(
            "/gallery/LiveMoment/{}/{:02}/{:02}/",
            self.date.year(),
            self.date.month(),
            self.date.day()
        )
    }
}

/// 秒数格式化为 `3h4m50s`
pub fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recording {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SongCut {
    #[serde(rename = "performed_at")]
    pub performed_at: String,
    #[serde(rename = "song_name")]
    pub song_name: String,
    pub url: String,
    pub cover_thumbnail_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Screenshot {
    pub url: String,
    pub thumbnail_url: String,
}

/// 直播接口返回结构
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LivestreamView {
    pub id: String,
    pub date: String,
    pub title: String,
    pub summary: String,
    pub view_count: String,
    pub danmaku_count: String,
    pub start_time: String,
    pub end_time: String,
    pub duration: String,
    pub bvid: String,
    pub parts: i64,
    pub cover_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recordings: Option<Vec<Recording>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub song_cuts: Option<Vec<SongCut>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshots: Option<Vec<Screenshot>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub danmaku_cloud_url: Option<String>,
}

impl LivestreamView {
    pub fn basic(live: &Livestream, cover_url: String) -> Self {
        let date = live.date.format("%Y-%m-%d").to_string();
        let summary = if live.summary.is_empty() {
            format!("{} 的精彩直播时刻", date)
        } else {
            live.summary.clone()
        };
        let fmt_time = |t: Option<NaiveTime>| {
            t.map(|t| t.format("%H:%M").to_string())
                .unwrap_or_else(|| "N/A".to_string())
        };

        Self {
            id: date.clone(),
            date,
            title: live.title.clone(),
            summary,
            view_count: live.view_count.clone(),
            danmaku_count: live.danmaku_count.clone(),
            start_time: fmt_time(live.start_time),
            end_time: fmt_time(live.end_time),
            duration: if live.duration_formatted.is_empty() {
                "N/A".to_string()
            } else {
                live.duration_formatted.clone()
            },
            bvid: live.bvid.clone().unwrap_or_default(),
            parts: live.parts,
            cover_url,
            recordings: None,
            song_cuts: None,
            screenshots: None,
            danmaku_cloud_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LivestreamPayload {
    pub date: Option<String>,
    pub title: Option<String>,
    pub summary: Option<String>,
    pub bvid: Option<String>,
    pub duration_seconds: Option<i64>,
    pub parts: Option<i64>,
    pub live_moment: Option<String>,
    pub cover_url: Option<String>,
    pub view_count: Option<String>,
    pub danmaku_count: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub danmaku_cloud_url: Option<String>,
    pub is_active: Option<bool>,
    pub sort_order: Option<i64>,
}

impl LivestreamPayload {
    pub fn parse_time(field: &'static str, value: &Option<String>) -> Result<Option<NaiveTime>, ValidationError> {
        match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            None => Ok(None),
            Some(v) => NaiveTime::parse_from_str(v, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(v, "%H:%M"))
                .map(Some)
                .map_err(|_| ValidationError::InvalidTime {
                    field,
                    value: v.to_string(),
                }),
        }
    }
}

impl Validator for LivestreamPayload {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if let Some(ref date) = self.date {
            DateValidator::parse_date(date)?;
        }
        if let Some(ref title) = self.title {
            StringValidator::validate_title(title)?;
        }
        if let Some(ref bvid) = self.bvid {
            if !bvid.is_empty() {
                StringValidator::validate_bvid(bvid)?;
            }
        }
        if matches!(self.duration_seconds, Some(d) if d < 0) {
            return Err(ValidationError::Negative { field: "duration_seconds" });
        }
        if matches!(self.parts, Some(p) if p < 1) {
            return Err(ValidationError::Negative { field: "parts" });
        }
        Self::parse_time("start_time", &self.start_time)?;
        Self::parse_time("end_time", &self.end_time)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LivestreamMonthQuery {
    pub year: Option<i32>,
    pub month: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(parts: i64, bvid: Option<&str>) -> Livestream {
        let now = Utc::now();
        Livestream {
            id: 1,
            date: NaiveDate::from_ymd_opt(2025, 11, 30).unwrap(),
            title: "直播回放".into(),
            summary: String::new(),
            bvid: bvid.map(str::to_string),
            duration_seconds: None,
            duration_formatted: String::new(),
            parts,
            live_moment: String::new(),
            cover_url: None,
            view_count: "N/A".into(),
            danmaku_count: "N/A".into(),
            start_time: NaiveTime::from_hms_opt(20, 0, 0),
            end_time: None,
            danmaku_cloud_url: String::new(),
            is_active: true,
            sort_order: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(11090), "3h4m50s");
        assert_eq!(format_duration(65), "1m5s");
        assert_eq!(format_duration(9), "9s");
    }

    #[test]
    fn test_recordings_per_part() {
        assert_eq!(sample(1, Some("BV1xx411c7mD")).recordings().len(), 1);
        let multi = sample(3, Some("BV1xx411c7mD")).recordings();
        assert_eq!(multi[2].url, "https://www.bilibili.com/video/BV1xx411c7mD?p=3");
        assert!(sample(3, None).recordings().is_empty());
    }

    #[test]
    fn test_basic_view_defaults() {
        let view = LivestreamView::basic(&sample(1, None), String::new());
        assert_eq!(view.summary, "2025-11-30 的精彩直播时刻");
        assert_eq!(view.start_time, "20:00");
        assert_eq!(view.end_time, "N/A");
        assert_eq!(view.duration, "N/A");
    }

    #[test]
    fn test_live_moment_default_dir() {
        assert_eq!(sample(1, None).live_moment_dir(), "/gallery/LiveMoment/2025/11/30/");
    }
}
