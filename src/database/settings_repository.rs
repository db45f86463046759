use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{Pool, QueryBuilder, Sqlite};

use crate::models::{
    CreateMilestoneRequest, CreateRecommendationRequest, Milestone, Recommendation, RecommendationView,
    SiteSettings, UpdateSiteSettingsRequest,
};
use crate::models::settings::RecommendedSong;

// ============ SiteSettings ============

/// 网站设置只有一行，取最早的那行
pub async fn get_settings(pool: &Pool<Sqlite>) -> Result<Option<SiteSettings>> {
    let settings: Option<SiteSettings> = sqlx::query_as("SELECT * FROM site_settings ORDER BY id LIMIT 1")
        .fetch_optional(pool)
        .await?;
    Ok(settings)
}

/// 更新网站设置，不存在时先创建
pub async fn upsert_settings(
    pool: &Pool<Sqlite>,
    req: &UpdateSiteSettingsRequest,
    birthday: Option<NaiveDate>,
) -> Result<SiteSettings> {
    let id = match get_settings(pool).await? {
        Some(existing) => existing.id,
        None => sqlx::query("INSERT INTO site_settings (created_at, updated_at) VALUES (datetime('now'), datetime('now'))")
            .execute(pool)
            .await?
            .last_insert_rowid(),
    };

    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE site_settings SET updated_at = datetime('now')");

    let text_fields: [(&str, &Option<String>); 12] = [
        ("favicon", &req.favicon),
        ("artist_name", &req.artist_name),
        ("artist_avatar", &req.artist_avatar),
        ("artist_constellation", &req.artist_constellation),
        ("artist_location", &req.artist_location),
        ("bilibili_url", &req.bilibili_url),
        ("weibo_url", &req.weibo_url),
        ("netease_music_url", &req.netease_music_url),
        ("youtube_url", &req.youtube_url),
        ("qq_music_url", &req.qq_music_url),
        ("xiaohongshu_url", &req.xiaohongshu_url),
        ("douyin_url", &req.douyin_url),
    ];
    for (column, value) in text_fields {
        if let Some(value) = value {
            query.push(format!(", {} = ", column)).push_bind(value.clone());
        }
    }

    if let Some(birthday) = birthday {
        query.push(", artist_birthday = ").push_bind(birthday);
    }
    if let Some(ref profession) = req.artist_profession {
        query.push(", artist_profession = ").push_bind(serde_json::to_string(profession)?);
    }
    if let Some(ref features) = req.artist_voice_features {
        query.push(", artist_voice_features = ").push_bind(serde_json::to_string(features)?);
    }

    query.push(" WHERE id = ").push_bind(id);
    query.build().execute(pool).await?;

    get_settings(pool)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Site settings vanished after update"))
}

// ============ Recommendation ============

/// 最新一条启用的推荐语
pub async fn get_active_recommendation(pool: &Pool<Sqlite>) -> Result<Option<RecommendationView>> {
    let recommendation: Option<Recommendation> = sqlx::query_as(
        "SELECT * FROM recommendations WHERE is_active = 1 ORDER BY updated_at DESC, id DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await?;

    match recommendation {
        Some(r) => Ok(Some(recommendation_view(pool, r).await?)),
        None => Ok(None),
    }
}

async fn recommendation_view(pool: &Pool<Sqlite>, r: Recommendation) -> Result<RecommendationView> {
    let songs: Vec<(i64, String, Option<String>)> = sqlx::query_as(
        r#"SELECT s.id, s.song_name, s.singer FROM recommendation_songs rs
           JOIN songs s ON s.id = rs.song_id
           WHERE rs.recommendation_id = ? ORDER BY s.song_name"#,
    )
    .bind(r.id)
    .fetch_all(pool)
    .await?;

    Ok(RecommendationView {
        id: r.id,
        content: r.content,
        is_active: r.is_active,
        recommended_songs_details: songs
            .into_iter()
            .map(|(id, song_name, singer)| RecommendedSong { id, song_name, singer })
            .collect(),
        updated_at: r.updated_at,
    })
}

/// 创建推荐语；不存在的歌曲ID忽略
pub async fn create_recommendation(
    pool: &Pool<Sqlite>,
    req: &CreateRecommendationRequest,
) -> Result<RecommendationView> {
    let id = sqlx::query(
        "INSERT INTO recommendations (content, is_active, created_at, updated_at) VALUES (?, ?, datetime('now'), datetime('now'))",
    )
    .bind(req.content.trim())
    .bind(req.is_active)
    .execute(pool)
    .await?
    .last_insert_rowid();

    for song_id in &req.recommended_songs {
        sqlx::query(
            r#"INSERT OR IGNORE INTO recommendation_songs (recommendation_id, song_id)
               SELECT ?, id FROM songs WHERE id = ?"#,
        )
        .bind(id)
        .bind(song_id)
        .execute(pool)
        .await?;
    }

    let recommendation: Recommendation = sqlx::query_as("SELECT * FROM recommendations WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    recommendation_view(pool, recommendation).await
}

// ============ Milestone ============

pub async fn list_milestones(pool: &Pool<Sqlite>) -> Result<Vec<Milestone>> {
    let milestones: Vec<Milestone> =
        sqlx::query_as("SELECT * FROM milestones ORDER BY display_order, date DESC, id")
            .fetch_all(pool)
            .await?;
    Ok(milestones)
}

pub async fn create_milestone(
    pool: &Pool<Sqlite>,
    req: &CreateMilestoneRequest,
    date: NaiveDate,
) -> Result<Milestone> {
    let id = sqlx::query(
        "INSERT INTO milestones (date, title, description, display_order, created_at) VALUES (?, ?, ?, ?, datetime('now'))",
    )
    .bind(date)
    .bind(req.title.trim())
    .bind(req.description.trim())
    .bind(req.display_order)
    .execute(pool)
    .await?
    .last_insert_rowid();

    let milestone: Milestone = sqlx::query_as("SELECT * FROM milestones WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(milestone)
}
