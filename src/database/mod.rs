use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::str::FromStr;
use std::time::Duration;

pub mod diy_repository;
pub mod follower_repository;
pub mod gallery_repository;
pub mod livestream_repository;
pub mod query_builder;
pub mod schema;
pub mod settings_repository;
pub mod song_repository;

pub use query_builder::SongQueryBuilder;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// 连接数据库、执行迁移并校验表结构
    pub async fn new(database_url: &str) -> Result<Self> {
        tracing::info!("Connecting to database: {}", database_url);

        // 配置 SQLite 连接选项
        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        // SQLite 单写入者，限制为1个连接；内存库需要连接常驻
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(connect_options)
            .await?;

        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;

        schema::verify_schema(&pool).await?;

        let stats = schema::get_database_stats(&pool).await?;
        tracing::info!(
            "Database initialized - Songs: {}, Records: {}, Galleries: {}, Livestreams: {}, Size: {:.2} MB",
            stats.song_count,
            stats.record_count,
            stats.gallery_count,
            stats.livestream_count,
            stats.database_size_mb()
        );

        Ok(Self { pool })
    }

    /// 测试用内存数据库
    pub async fn in_memory() -> Result<Self> {
        Self::new("sqlite::memory:").await
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// 获取数据库统计信息
    pub async fn get_stats(&self) -> Result<schema::DatabaseStats> {
        schema::get_database_stats(&self.pool).await
    }

    /// 验证数据库完整性
    pub async fn verify_integrity(&self) -> Result<()> {
        schema::verify_schema(&self.pool).await
    }
}
