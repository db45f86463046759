// 粉丝数据
//
// 导入爬虫输出的 `b_fans_count_*.json`，或直接通过 B站 relation 接口抓取；
// 查询时返回当前粉丝数与带增量的历史序列。

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::database::follower_repository;
use crate::external::bilibili::BilibiliClient;
use crate::models::{AccountFollowers, FollowerPoint, IngestResult, SpiderFollowerFile};

pub const SPIDER_FILE_PREFIX: &str = "b_fans_count_";
pub const DEFAULT_HISTORY_LIMIT: i64 = 30;
pub const MAX_HISTORY_LIMIT: i64 = 1000;

const CRAWL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct FollowerService {
    pool: Pool<Sqlite>,
}

impl FollowerService {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// 导入一份爬虫数据；`update_time` 缺失或格式错误时以当前时间为抓取时间
    pub async fn ingest(&self, data: &SpiderFollowerFile) -> Result<IngestResult> {
        let crawl_time = data
            .update_time
            .as_deref()
            .and_then(|t| NaiveDateTime::parse_from_str(t.trim(), CRAWL_TIME_FORMAT).ok())
            .unwrap_or_else(|| Local::now().naive_local());

        let mut result = IngestResult::default();
        for acc in &data.accounts {
            let uid = acc.uid_string();
            let account = follower_repository::get_or_create_account(&self.pool, &uid, &acc.display_name()).await?;

            match (acc.status.as_deref(), acc.follower) {
                (Some("success"), Some(count)) => {
                    follower_repository::upsert_metric(&self.pool, account.id, crawl_time, count).await?;
                    result.success_count += 1;
                }
                _ => {
                    result.error_count += 1;
                    result.errors.push(format!(
                        "{}: {}",
                        acc.display_name(),
                        acc.message.as_deref().unwrap_or("Unknown error")
                    ));
                }
            }
        }

        info!(
            "导入粉丝数据 ({}): 成功 {}, 失败 {}",
            crawl_time, result.success_count, result.error_count
        );
        Ok(result)
    }

    pub async fn ingest_file(&self, path: &Path) -> Result<IngestResult> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("读取文件失败: {}", path.display()))?;
        let data: SpiderFollowerFile =
            serde_json::from_str(&raw).with_context(|| format!("解析文件失败: {}", path.display()))?;
        self.ingest(&data).await
    }

    /// 递归导入目录下所有 `b_fans_count_*.json`（按路径排序）；单个文件失败不影响其他文件
    pub async fn ingest_dir(&self, dir: &Path) -> Result<IngestResult> {
        let files = spider_files(dir);
        info!("找到 {} 个数据文件: {}", files.len(), dir.display());

        let mut total = IngestResult::default();
        for file in files {
            match self.ingest_file(&file).await {
                Ok(r) => {
                    total.success_count += r.success_count;
                    total.error_count += r.error_count;
                    total.errors.extend(r.errors);
                }
                Err(e) => {
                    warn!("导入失败: {:#}", e);
                    total.errors.push(format!("{}: {:#}", file.display(), e));
                }
            }
        }
        Ok(total)
    }

    /// 直接抓取所有启用账号的当前粉丝数
    pub async fn crawl(&self, client: &BilibiliClient) -> Result<IngestResult> {
        let crawl_time = Local::now().naive_local();
        let mut result = IngestResult::default();

        for account in follower_repository::list_active_accounts(&self.pool).await? {
            match client.get_relation_stat(&account.uid).await {
                Ok(stat) => {
                    follower_repository::upsert_metric(&self.pool, account.id, crawl_time, stat.follower).await?;
                    result.success_count += 1;
                }
                Err(e) => {
                    warn!("抓取粉丝数失败: {} ({}) - {}", account.name, account.uid, e);
                    result.error_count += 1;
                    result.errors.push(format!("{}: {}", account.name, e));
                }
            }
        }
        Ok(result)
    }

    /// 全部启用账号及当前粉丝数
    pub async fn accounts(&self) -> Result<Vec<AccountFollowers>> {
        let mut views = Vec::new();
        for account in follower_repository::list_active_accounts(&self.pool).await? {
            let current = follower_repository::latest_metric(&self.pool, account.id)
                .await?
                .map(|m| m.follower_count);
            views.push(AccountFollowers {
                id: account.id.to_string(),
                name: account.name,
                uid: account.uid,
                current,
                history: Vec::new(),
            });
        }
        Ok(views)
    }

    /// 单个账号的历史序列；账号不存在或已停用时返回 `None`
    pub async fn history(&self, account_id: i64, limit: Option<i64>) -> Result<Option<AccountFollowers>> {
        let Some(account) = follower_repository::get_account(&self.pool, account_id)
            .await?
            .filter(|a| a.is_active)
        else {
            return Ok(None);
        };

        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        let metrics = follower_repository::metric_history(&self.pool, account.id, limit).await?;

        Ok(Some(AccountFollowers {
            id: account.id.to_string(),
            name: account.name,
            uid: account.uid,
            current: metrics.last().map(|m| m.follower_count),
            history: FollowerPoint::series(&metrics),
        }))
    }
}

fn spider_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_string_lossy();
            name.starts_with(SPIDER_FILE_PREFIX) && name.ends_with(".json")
        })
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
