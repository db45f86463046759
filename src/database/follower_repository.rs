use anyhow::Result;
use chrono::NaiveDateTime;
use sqlx::{Pool, Sqlite};

use crate::models::{Account, FollowerMetric};

pub async fn list_active_accounts(pool: &Pool<Sqlite>) -> Result<Vec<Account>> {
    let accounts: Vec<Account> =
        sqlx::query_as("SELECT * FROM analytics_accounts WHERE is_active = 1 ORDER BY id")
            .fetch_all(pool)
            .await?;
    Ok(accounts)
}

pub async fn get_account(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Account>> {
    let account: Option<Account> = sqlx::query_as("SELECT * FROM analytics_accounts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(account)
}

/// 按 uid 取账号，不存在则创建；名称变化时同步
pub async fn get_or_create_account(pool: &Pool<Sqlite>, uid: &str, name: &str) -> Result<Account> {
    sqlx::query(
        r#"INSERT INTO analytics_accounts (uid, name, platform, is_active, created_at, updated_at)
           VALUES (?, ?, 'bilibili', 1, datetime('now'), datetime('now'))
           ON CONFLICT(uid) DO UPDATE SET
               name = excluded.name,
               updated_at = CASE WHEN analytics_accounts.name = excluded.name
                                 THEN analytics_accounts.updated_at ELSE datetime('now') END"#,
    )
    .bind(uid)
    .bind(name)
    .execute(pool)
    .await?;

    let account: Account = sqlx::query_as("SELECT * FROM analytics_accounts WHERE uid = ?")
        .bind(uid)
        .fetch_one(pool)
        .await?;
    Ok(account)
}

/// 同一账号同一抓取时间只保留一条，重复写入覆盖粉丝数
pub async fn upsert_metric(
    pool: &Pool<Sqlite>,
    account_id: i64,
    crawl_time: NaiveDateTime,
    follower_count: i64,
) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO follower_metrics (account_id, follower_count, crawl_time, ingest_time)
           VALUES (?, ?, ?, datetime('now'))
           ON CONFLICT(account_id, crawl_time) DO UPDATE SET
               follower_count = excluded.follower_count,
               ingest_time = datetime('now')"#,
    )
    .bind(account_id)
    .bind(follower_count)
    .bind(crawl_time)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn latest_metric(pool: &Pool<Sqlite>, account_id: i64) -> Result<Option<FollowerMetric>> {
    let metric: Option<FollowerMetric> = sqlx::query_as(
        r#"SELECT id, account_id, follower_count, crawl_time FROM follower_metrics
           WHERE account_id = ? ORDER BY crawl_time DESC LIMIT 1"#,
    )
    .bind(account_id)
    .fetch_optional(pool)
    .await?;
    Ok(metric)
}

/// 最近 `limit` 条记录，按时间升序返回
pub async fn metric_history(pool: &Pool<Sqlite>, account_id: i64, limit: i64) -> Result<Vec<FollowerMetric>> {
    let mut metrics: Vec<FollowerMetric> = sqlx::query_as(
        r#"SELECT id, account_id, follower_count, crawl_time FROM follower_metrics
           WHERE account_id = ? ORDER BY crawl_time DESC LIMIT ?"#,
    )
    .bind(account_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    metrics.reverse();
    Ok(metrics)
}
