use anyhow::Result;
use serde::Serialize;
use sqlx::{Pool, Row, Sqlite};

/// 验证数据库schema完整性
pub async fn verify_schema(pool: &Pool<Sqlite>) -> Result<()> {
    // 检查所有必需的表是否存在
    let required_tables = [
        "songs",
        "song_records",
        "styles",
        "song_styles",
        "tags",
        "song_tags",
        "original_works",
        "gallery",
        "diy_collections",
        "diy_works",
        "livestream",
        "site_settings",
        "recommendations",
        "recommendation_songs",
        "milestones",
        "analytics_accounts",
        "follower_metrics",
    ];

    for table in required_tables {
        let exists = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name=?")
            .bind(table)
            .fetch_optional(pool)
            .await?;

        if exists.is_none() {
            return Err(anyhow::anyhow!("Required table '{}' does not exist", table));
        }
    }

    // 检查关键索引是否存在
    let required_indexes = [
        "idx_song_records_song_performed",
        "idx_gallery_parent",
        "idx_diy_works_collection",
    ];

    for index in required_indexes {
        let exists = sqlx::query("SELECT name FROM sqlite_master WHERE type='index' AND name=?")
            .bind(index)
            .fetch_optional(pool)
            .await?;

        if exists.is_none() {
            return Err(anyhow::anyhow!("Required index '{}' does not exist", index));
        }
    }

    // 图集级联删除依赖外键
    let foreign_keys_enabled: i32 = sqlx::query("PRAGMA foreign_keys")
        .fetch_one(pool)
        .await?
        .get(0);

    if foreign_keys_enabled != 1 {
        tracing::warn!("Foreign key constraints are not enabled");
    }

    tracing::info!("Database schema verification completed successfully");
    Ok(())
}

/// 获取数据库统计信息
pub async fn get_database_stats(pool: &Pool<Sqlite>) -> Result<DatabaseStats> {
    let song_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM songs")
        .fetch_one(pool)
        .await?;

    let record_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM song_records")
        .fetch_one(pool)
        .await?;

    let gallery_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM gallery")
        .fetch_one(pool)
        .await?;

    let livestream_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM livestream")
        .fetch_one(pool)
        .await?;

    // 获取数据库文件大小
    let db_size: i64 = sqlx::query_scalar(
        "SELECT page_count * page_size as size FROM pragma_page_count(), pragma_page_size()",
    )
    .fetch_one(pool)
    .await?;

    Ok(DatabaseStats {
        song_count,
        record_count,
        gallery_count,
        livestream_count,
        database_size_bytes: db_size,
    })
}

/// 数据库统计信息
#[derive(Debug, Serialize)]
pub struct DatabaseStats {
    pub song_count: i64,
    pub record_count: i64,
    pub gallery_count: i64,
    pub livestream_count: i64,
    pub database_size_bytes: i64,
}

impl DatabaseStats {
    pub fn database_size_mb(&self) -> f64 {
        self.database_size_bytes as f64 / (1024.0 * 1024.0)
    }
}
