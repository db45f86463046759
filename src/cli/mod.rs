// 命令行入口
//
// 不带子命令时启动 HTTP 服务；其余子命令是运维任务，
// 共用同一套配置、数据库与服务。

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;

use crate::api::{build_router, AppState};
use crate::config::AppConfig;
use crate::database::Database;
use crate::models::MergeSongsRequest;

const DEFAULT_SPIDER_DIR: &str = "data/spider/fans_count";

/// 粉丝站后端
#[derive(Debug, Parser)]
#[command(name = "fans_home_backend", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// 启动 HTTP 服务
    Serve,
    /// 从 media/gallery 目录同步图集
    SyncGallery,
    /// 批量生成缩略图
    GenerateThumbnails {
        /// 只处理指定模块（gallery、covers、footprint 等）
        #[arg(long)]
        module: Option<String>,
        /// 覆盖已有缩略图
        #[arg(long)]
        force: bool,
    },
    /// 删除原图已不存在的缩略图
    CleanupThumbnails,
    /// 清空本进程的接口缓存
    ClearCache,
    /// 把 <from> 的演唱记录并入 <to>
    MergeSongs { from: i64, to: i64 },
    /// 重算所有歌曲的演唱次数与首末次日期
    RebuildSongStats,
    /// 按BV号导入演唱记录
    ImportBv { bvid: String },
    /// 导入爬虫输出的粉丝数 JSON
    IngestFollower {
        #[arg(long, conflicts_with = "dir")]
        file: Option<PathBuf>,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// 重新统计所有图集的图片数
    RefreshGalleryCounts,
    /// 通过 B站接口抓取所有账号的当前粉丝数
    CrawlFollowers,
}

impl Cli {
    pub async fn execute(self, config: AppConfig) -> Result<()> {
        let command = self.command.unwrap_or(Commands::Serve);

        let database = Database::new(&config.database_url).await?;
        let state = AppState::new(database, config)?;

        match command {
            Commands::Serve => serve(state).await,
            Commands::SyncGallery => {
                let report = state.galleries.sync_from_folder().await?;
                print_json(&report)
            }
            Commands::GenerateThumbnails { module, force } => {
                let stats = state.thumbnails.batch_generate(module.as_deref(), force).await?;
                print_json(&stats)
            }
            Commands::CleanupThumbnails => {
                let stats = state.thumbnails.cleanup_orphans().await?;
                print_json(&stats)
            }
            Commands::ClearCache => {
                state.cache.clear().await;
                println!("缓存已清空");
                Ok(())
            }
            Commands::MergeSongs { from, to } => {
                let request = MergeSongsRequest {
                    target_id: to,
                    source_ids: vec![from],
                };
                let result = state.songs.merge(&request).await?;
                print_json(&result)
            }
            Commands::RebuildSongStats => {
                let updated = state.songs.rebuild_stats().await?;
                println!("已更新 {} 首歌曲", updated);
                Ok(())
            }
            Commands::ImportBv { bvid } => {
                let outcome = state.importer.import_bv(bvid.trim(), None, None).await?;
                print_json(&outcome)?;
                if let Some(error) = outcome.error {
                    bail!("{}", error);
                }
                if outcome.conflict.is_some() {
                    bail!("存在同名歌曲冲突，请在管理后台选择后继续导入");
                }
                Ok(())
            }
            Commands::IngestFollower { file, dir } => {
                let result = match file {
                    Some(file) => state.followers.ingest_file(&file).await?,
                    None => {
                        let dir = dir.unwrap_or_else(|| PathBuf::from(DEFAULT_SPIDER_DIR));
                        state.followers.ingest_dir(&dir).await?
                    }
                };
                print_json(&result)
            }
            Commands::RefreshGalleryCounts => {
                let updated = state.galleries.refresh_all_counts().await?;
                println!("已刷新 {} 个图集", updated);
                Ok(())
            }
            Commands::CrawlFollowers => {
                let result = state.followers.crawl(&state.bilibili).await?;
                print_json(&result)
            }
        }
    }
}

async fn serve(state: AppState) -> Result<()> {
    let addr = state.config.bind_addr();
    tokio::fs::create_dir_all(&state.config.media_root)
        .await
        .with_context(|| format!("创建媒体目录失败: {}", state.config.media_root.display()))?;

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听失败: {}", addr))?;
    info!("🚀 Server listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
