use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use sqlx::{Pool, QueryBuilder, Sqlite};

use crate::models::{format_duration, Livestream, LivestreamPayload};

/// 某月启用的直播（日期倒序）
pub async fn list_by_month(pool: &Pool<Sqlite>, year: i32, month: u32) -> Result<Vec<Livestream>> {
    let prefix = format!("{:04}-{:02}-%", year, month);
    let lives: Vec<Livestream> = sqlx::query_as(
        "SELECT * FROM livestream WHERE is_active = 1 AND date LIKE ? ORDER BY date DESC, sort_order DESC",
    )
    .bind(prefix)
    .fetch_all(pool)
    .await?;
    Ok(lives)
}

pub async fn get_by_date(pool: &Pool<Sqlite>, date: NaiveDate) -> Result<Option<Livestream>> {
    let live: Option<Livestream> = sqlx::query_as("SELECT * FROM livestream WHERE date = ?")
        .bind(date)
        .fetch_optional(pool)
        .await?;
    Ok(live)
}

/// 新建直播记录；`times` 为已解析的开播/下播时间
pub async fn create_livestream(
    pool: &Pool<Sqlite>,
    date: NaiveDate,
    title: &str,
    payload: &LivestreamPayload,
    times: (Option<NaiveTime>, Option<NaiveTime>),
) -> Result<Livestream> {
    let duration_formatted = payload
        .duration_seconds
        .map(format_duration)
        .unwrap_or_default();

    sqlx::query(
        r#"INSERT INTO livestream (date, title, summary, bvid, duration_seconds, duration_formatted, parts,
                                   live_moment, cover_url, view_count, danmaku_count, start_time, end_time,
                                   danmaku_cloud_url, is_active, sort_order, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'), datetime('now'))"#,
    )
    .bind(date)
    .bind(title.trim())
    .bind(payload.summary.clone().unwrap_or_default())
    .bind(payload.bvid.clone().filter(|b| !b.is_empty()))
    .bind(payload.duration_seconds)
    .bind(duration_formatted)
    .bind(payload.parts.unwrap_or(1))
    .bind(payload.live_moment.clone().unwrap_or_default())
    .bind(payload.cover_url.clone().filter(|c| !c.is_empty()))
    .bind(payload.view_count.clone().unwrap_or_else(|| "N/A".to_string()))
    .bind(payload.danmaku_count.clone().unwrap_or_else(|| "N/A".to_string()))
    .bind(times.0)
    .bind(times.1)
    .bind(payload.danmaku_cloud_url.clone().unwrap_or_default())
    .bind(payload.is_active.unwrap_or(true))
    .bind(payload.sort_order.unwrap_or(0))
    .execute(pool)
    .await?;

    get_by_date(pool, date)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Livestream {} vanished after insert", date))
}

/// 部分更新；时长变化时同步 duration_formatted
pub async fn update_livestream(
    pool: &Pool<Sqlite>,
    date: NaiveDate,
    payload: &LivestreamPayload,
    times: (Option<NaiveTime>, Option<NaiveTime>),
) -> Result<Option<Livestream>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE livestream SET updated_at = datetime('now')");

    if let Some(ref title) = payload.title {
        query.push(", title = ").push_bind(title.trim().to_string());
    }
    if let Some(ref summary) = payload.summary {
        query.push(", summary = ").push_bind(summary.clone());
    }
    if let Some(ref bvid) = payload.bvid {
        query.push(", bvid = ").push_bind(Some(bvid.clone()).filter(|b| !b.is_empty()));
    }
    if let Some(seconds) = payload.duration_seconds {
        query.push(", duration_seconds = ").push_bind(seconds);
        query.push(", duration_formatted = ").push_bind(format_duration(seconds));
    }
    if let Some(parts) = payload.parts {
        query.push(", parts = ").push_bind(parts);
    }
    if let Some(ref live_moment) = payload.live_moment {
        query.push(", live_moment = ").push_bind(live_moment.clone());
    }
    if let Some(ref cover_url) = payload.cover_url {
        query.push(", cover_url = ").push_bind(Some(cover_url.clone()).filter(|c| !c.is_empty()));
    }
    if let Some(ref view_count) = payload.view_count {
        query.push(", view_count = ").push_bind(view_count.clone());
    }
    if let Some(ref danmaku_count) = payload.danmaku_count {
        query.push(", danmaku_count = ").push_bind(danmaku_count.clone());
    }
    if payload.start_time.is_some() {
        query.push(", start_time = ").push_bind(times.0);
    }
    if payload.end_time.is_some() {
        query.push(", end_time = ").push_bind(times.1);
    }
    if let Some(ref url) = payload.danmaku_cloud_url {
        query.push(", danmaku_cloud_url = ").push_bind(url.clone());
    }
    if let Some(is_active) = payload.is_active {
        query.push(", is_active = ").push_bind(is_active);
    }
    if let Some(sort_order) = payload.sort_order {
        query.push(", sort_order = ").push_bind(sort_order);
    }

    query.push(" WHERE date = ").push_bind(date);
    let result = query.build().execute(pool).await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }

    get_by_date(pool, date).await
}

pub async fn delete_livestream(pool: &Pool<Sqlite>, date: NaiveDate) -> Result<bool> {
    let result = sqlx::query("DELETE FROM livestream WHERE date = ?")
        .bind(date)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
