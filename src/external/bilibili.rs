use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::BilibiliConfig;

pub const BILIBILI_API_BASE: &str = "https://api.bilibili.com";

const BROWSER_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";
const BILIBILI_REFERER: &str = "https://www.bilibili.com";

/// B站接口错误
#[derive(Debug, Error)]
pub enum BilibiliError {
    #[error("B站API错误 [{code}]: {message}")]
    Api { code: i64, message: String },

    #[error("请求超时（{0}秒）")]
    Timeout(u64),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("响应解析失败: {0}")]
    Decode(String),

    #[error("客户端初始化失败: {0}")]
    Client(String),
}

/// B站统一响应外壳 `{code, message, data}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoOwner {
    #[serde(default)]
    pub mid: i64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoStat {
    #[serde(default)]
    pub view: i64,
    #[serde(default)]
    pub danmaku: i64,
    #[serde(default)]
    pub like: i64,
}

/// `/x/web-interface/view` 返回的视频信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub bvid: String,
    #[serde(default)]
    pub title: String,
    /// 封面地址
    #[serde(default)]
    pub pic: String,
    #[serde(default)]
    pub owner: VideoOwner,
    #[serde(default)]
    pub pubdate: i64,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub duration: i64,
    #[serde(default)]
    pub stat: VideoStat,
}

/// 分P信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    #[serde(default)]
    pub cid: i64,
    /// 分P标题
    #[serde(default)]
    pub part: String,
    #[serde(default)]
    pub duration: i64,
}

impl PageInfo {
    pub fn player_url(&self, bvid: &str) -> String {
        format!("https://player.bilibili.com/player.html?bvid={}&p={}", bvid, self.page)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationStat {
    #[serde(default)]
    pub follower: i64,
    #[serde(default)]
    pub following: i64,
}

/// 视频元数据来源，导入器依赖此接口
#[async_trait]
pub trait VideoMetadataSource: Send + Sync {
    async fn video_info(&self, bvid: &str) -> Result<VideoInfo, BilibiliError>;
    async fn page_list(&self, bvid: &str) -> Result<Vec<PageInfo>, BilibiliError>;
}

/// B站API客户端
#[derive(Clone)]
pub struct BilibiliClient {
    client: Client,
    base_url: String,
    timeout: Duration,
    retry_times: u32,
    retry_delay: Duration,
}

impl BilibiliClient {
    pub fn new(config: &BilibiliConfig) -> Result<Self, BilibiliError> {
        Self::with_base_url(config, BILIBILI_API_BASE)
    }

    pub fn with_base_url(config: &BilibiliConfig, base_url: &str) -> Result<Self, BilibiliError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_UA));
        headers.insert(REFERER, HeaderValue::from_static(BILIBILI_REFERER));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| BilibiliError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout: config.timeout,
            retry_times: config.retry_times.max(1),
            retry_delay: config.retry_delay,
        })
    }

    /// 共享同一套请求头的 HTTP 客户端（封面下载复用）
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// 发起 GET 请求；`code != 0`、超时、网络错误都按固定间隔重试
    async fn get_data<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, BilibiliError> {
        let url = format!("{}{}", self.base_url, path);
        let mut last_error = None;

        for attempt in 1..=self.retry_times {
            match self.get_once::<T>(&url, query).await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    warn!("B站请求失败 (尝试 {}/{}): {} - {}", attempt, self.retry_times, url, e);
                    last_error = Some(e);
                    if attempt < self.retry_times {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| BilibiliError::Network("请求失败，已达到最大重试次数".to_string())))
    }

    async fn get_once<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, BilibiliError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?
            .error_for_status()
            .map_err(|e| self.map_reqwest(e))?;

        let envelope: Envelope<T> = response.json().await.map_err(|e| {
            if e.is_timeout() {
                BilibiliError::Timeout(self.timeout.as_secs())
            } else {
                BilibiliError::Decode(e.to_string())
            }
        })?;

        if envelope.code != 0 {
            let message = if envelope.message.is_empty() {
                "未知错误".to_string()
            } else {
                envelope.message
            };
            return Err(BilibiliError::Api { code: envelope.code, message });
        }

        envelope
            .data
            .ok_or_else(|| BilibiliError::Decode("响应缺少 data 字段".to_string()))
    }

    fn map_reqwest(&self, err: reqwest::Error) -> BilibiliError {
        if err.is_timeout() {
            BilibiliError::Timeout(self.timeout.as_secs())
        } else {
            BilibiliError::Network(err.to_string())
        }
    }

    /// 获取视频信息
    pub async fn get_video_info(&self, bvid: &str) -> Result<VideoInfo, BilibiliError> {
        debug!("获取视频信息: {}", bvid);
        self.get_data("/x/web-interface/view", &[("bvid", bvid.to_string())]).await
    }

    /// 获取分P列表
    pub async fn get_video_pagelist(&self, bvid: &str) -> Result<Vec<PageInfo>, BilibiliError> {
        debug!("获取分P列表: {}", bvid);
        self.get_data("/x/player/pagelist", &[("bvid", bvid.to_string())]).await
    }

    /// 获取粉丝数
    pub async fn get_relation_stat(&self, uid: &str) -> Result<RelationStat, BilibiliError> {
        self.get_data("/x/relation/stat", &[("vmid", uid.to_string())]).await
    }
}

#[async_trait]
impl VideoMetadataSource for BilibiliClient {
    async fn video_info(&self, bvid: &str) -> Result<VideoInfo, BilibiliError> {
        self.get_video_info(bvid).await
    }

    async fn page_list(&self, bvid: &str) -> Result<Vec<PageInfo>, BilibiliError> {
        self.get_video_pagelist(bvid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config() -> BilibiliConfig {
        BilibiliConfig {
            timeout: Duration::from_secs(2),
            retry_times: 3,
            retry_delay: Duration::from_millis(10),
            max_cover_size: 1024,
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_player_url() {
        let page = PageInfo { page: 3, cid: 1, part: "x".into(), duration: 0 };
        assert_eq!(
            page.player_url("BV1xx411c7mD"),
            "https://player.bilibili.com/player.html?bvid=BV1xx411c7mD&p=3"
        );
    }

    #[test]
    fn test_video_info_tolerates_missing_fields() {
        let raw = r#"{"bvid":"BV1xx411c7mD","pic":"https://i0.hdslb.com/a.jpg"}"#;
        let info: VideoInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.pic, "https://i0.hdslb.com/a.jpg");
        assert_eq!(info.stat.view, 0);
    }

    #[tokio::test]
    async fn test_pagelist_success() {
        let router = Router::new().route(
            "/x/player/pagelist",
            get(|| async {
                Json(serde_json::json!({
                    "code": 0,
                    "message": "0",
                    "data": [{"page": 1, "cid": 10, "part": "2025年6月12日 晴天", "duration": 200}]
                }))
            }),
        );
        let base = serve(router).await;
        let client = BilibiliClient::with_base_url(&fast_config(), &base).unwrap();

        let pages = client.get_video_pagelist("BV1xx411c7mD").await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].part, "2025年6月12日 晴天");
    }

    #[tokio::test]
    async fn test_nonzero_code_is_retried_then_reported() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let router = Router::new().route(
            "/x/web-interface/view",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(serde_json::json!({"code": -404, "message": "啥都木有"}))
                }
            }),
        );
        let base = serve(router).await;
        let client = BilibiliClient::with_base_url(&fast_config(), &base).unwrap();

        let err = client.get_video_info("BV1xx411c7mD").await.unwrap_err();
        assert!(matches!(err, BilibiliError::Api { code: -404, .. }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }
}
