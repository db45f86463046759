// 封面下载器
//
// 按演出日期保存到 `MEDIA_ROOT/covers/{YYYY}/{MM}/{YYYY-MM-DD}.jpg`，已存在的文件直接复用。

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::path::PathBuf;
use thiserror::Error;
use tokio::fs;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::BilibiliConfig;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("封面URL为空")]
    EmptyUrl,

    #[error("网络错误: {0}")]
    Network(String),

    #[error("下载超时")]
    Timeout,

    #[error("HTTP 错误: 状态码 {0}")]
    Http(u16),

    #[error("封面文件过大: {size} bytes (最大: {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for DownloadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DownloadError::Timeout
        } else if let Some(status) = err.status() {
            DownloadError::Http(status.as_u16())
        } else {
            DownloadError::Network(err.to_string())
        }
    }
}

/// 封面存储，导入器依赖此接口
#[async_trait]
pub trait CoverStore: Send + Sync {
    /// 返回本地 URL（`/covers/...`），失败返回 `None`
    async fn store_by_date(&self, cover_url: &str, date: NaiveDate) -> Option<String>;
}

pub struct CoverDownloader {
    client: Client,
    media_root: PathBuf,
    timeout: std::time::Duration,
    max_size: usize,
}

impl CoverDownloader {
    /// `client` 需已带 B站 请求头
    pub fn new(client: Client, media_root: PathBuf, config: &BilibiliConfig) -> Self {
        Self {
            client,
            media_root,
            timeout: config.timeout,
            max_size: config.max_cover_size,
        }
    }

    /// 日期对应的相对路径
    pub fn relative_path(date: NaiveDate) -> String {
        format!(
            "covers/{}/{}/{}.jpg",
            date.format("%Y"),
            date.format("%m"),
            date.format("%Y-%m-%d")
        )
    }

    /// 下载到 `relative`，已存在则跳过
    pub async fn download(&self, cover_url: &str, relative: &str) -> Result<String, DownloadError> {
        if cover_url.is_empty() {
            return Err(DownloadError::EmptyUrl);
        }

        let full_path = self.media_root.join(relative);
        let local_url = format!("/{}", relative);

        if fs::try_exists(&full_path).await.unwrap_or(false) {
            debug!("封面已存在: {}", relative);
            return Ok(local_url);
        }

        let data = match timeout(self.timeout, self.fetch(cover_url)).await {
            Ok(result) => result?,
            Err(_) => return Err(DownloadError::Timeout),
        };

        if data.len() > self.max_size {
            return Err(DownloadError::TooLarge { size: data.len(), max: self.max_size });
        }

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full_path, &data).await?;

        info!("封面已下载: {} ({} bytes)", relative, data.len());
        Ok(local_url)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl CoverStore for CoverDownloader {
    async fn store_by_date(&self, cover_url: &str, date: NaiveDate) -> Option<String> {
        match self.download(cover_url, &Self::relative_path(date)).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!("封面下载失败: {} - {}", cover_url, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use tempfile::TempDir;

    fn config(max: usize) -> BilibiliConfig {
        BilibiliConfig {
            max_cover_size: max,
            ..BilibiliConfig::default()
        }
    }

    async fn serve(body: &'static [u8]) -> String {
        let router = Router::new().route("/pic.jpg", get(move || async move { body }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/pic.jpg", addr)
    }

    #[test]
    fn test_relative_path() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 5).unwrap();
        assert_eq!(CoverDownloader::relative_path(date), "covers/2025/01/2025-01-05.jpg");
    }

    #[tokio::test]
    async fn test_download_and_reuse() {
        let dir = TempDir::new().unwrap();
        let url = serve(b"jpeg-bytes").await;
        let downloader = CoverDownloader::new(Client::new(), dir.path().to_path_buf(), &config(1024));
        let date = NaiveDate::from_ymd_opt(2025, 6, 12).unwrap();

        let local = downloader.store_by_date(&url, date).await;
        assert_eq!(local.as_deref(), Some("/covers/2025/06/2025-06-12.jpg"));
        let saved = dir.path().join("covers/2025/06/2025-06-12.jpg");
        assert_eq!(std::fs::read(&saved).unwrap(), b"jpeg-bytes");

        // 已存在的文件不再下载
        std::fs::write(&saved, b"old").unwrap();
        downloader.store_by_date(&url, date).await.unwrap();
        assert_eq!(std::fs::read(&saved).unwrap(), b"old");
    }

    #[tokio::test]
    async fn test_oversized_cover_rejected() {
        let dir = TempDir::new().unwrap();
        let url = serve(b"0123456789").await;
        let downloader = CoverDownloader::new(Client::new(), dir.path().to_path_buf(), &config(4));

        let err = downloader.download(&url, "covers/x.jpg").await.unwrap_err();
        assert!(matches!(err, DownloadError::TooLarge { size: 10, max: 4 }));
        assert!(!dir.path().join("covers/x.jpg").exists());
    }

    #[tokio::test]
    async fn test_empty_url() {
        let dir = TempDir::new().unwrap();
        let downloader = CoverDownloader::new(Client::new(), dir.path().to_path_buf(), &config(4));
        let date = NaiveDate::from_ymd_opt(2025, 6, 12).unwrap();
        assert!(downloader.store_by_date("", date).await.is_none());
    }
}
