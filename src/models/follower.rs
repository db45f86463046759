use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

/// 被追踪的B站账号
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: i64,
    pub uid: String,
    pub name: String,
    pub platform: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 某次抓取时的粉丝数
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FollowerMetric {
    pub id: i64,
    pub account_id: i64,
    pub follower_count: i64,
    pub crawl_time: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct FollowerPoint {
    pub time: String,
    pub value: i64,
    pub delta: i64,
}

impl FollowerPoint {
    /// 时间升序的记录转换为带增量的序列
    pub fn series(metrics: &[FollowerMetric]) -> Vec<FollowerPoint> {
        let mut prev: Option<i64> = None;
        metrics
            .iter()
            .map(|m| {
                let delta = prev.map(|p| m.follower_count - p).unwrap_or(0);
                prev = Some(m.follower_count);
                FollowerPoint {
                    time: m.crawl_time.format("%Y-%m-%d %H:%M:%S").to_string(),
                    value: m.follower_count,
                    delta,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountFollowers {
    pub id: String,
    pub name: String,
    pub uid: String,
    pub current: Option<i64>,
    pub history: Vec<FollowerPoint>,
}

/// 爬虫输出文件 `b_fans_count_*.json`
#[derive(Debug, Clone, Deserialize)]
pub struct SpiderFollowerFile {
    #[serde(default)]
    pub accounts: Vec<SpiderAccount>,
    /// `%Y-%m-%d %H:%M:%S`
    pub update_time: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpiderAccount {
    /// 可能是数字也可能是字符串
    pub uid: Value,
    pub name: Option<String>,
    pub status: Option<String>,
    pub follower: Option<i64>,
    pub message: Option<String>,
}

impl SpiderAccount {
    pub fn uid_string(&self) -> String {
        match &self.uid {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.uid_string())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestResult {
    pub success_count: usize,
    pub error_count: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FollowerHistoryQuery {
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spider_file_accepts_numeric_uid() {
        let raw = r#"{"accounts":[{"uid":123,"name":"主号","status":"success","follower":10}],
                      "update_time":"2025-01-01 12:00:00"}"#;
        let file: SpiderFollowerFile = serde_json::from_str(raw).unwrap();
        assert_eq!(file.accounts[0].uid_string(), "123");
    }

    #[test]
    fn test_series_delta() {
        let t = |h| {
            NaiveDateTime::parse_from_str(&format!("2025-01-01 {:02}:00:00", h), "%Y-%m-%d %H:%M:%S")
                .unwrap()
        };
        let metrics = vec![
            FollowerMetric { id: 1, account_id: 1, follower_count: 100, crawl_time: t(1) },
            FollowerMetric { id: 2, account_id: 1, follower_count: 130, crawl_time: t(2) },
        ];
        let series = FollowerPoint::series(&metrics);
        assert_eq!(series[0].delta, 0);
        assert_eq!(series[1].delta, 30);
    }
}
