use anyhow::Result;
use chrono::NaiveDate;
use sqlx::{Executor, Pool, QueryBuilder, Sqlite};
use std::collections::HashMap;

use super::query_builder::SongQueryBuilder;
use crate::models::{OriginalWork, Song, SongListQuery, SongRecord, SongView, TopSong};

// ============ Song 查询 ============

/// 统计符合过滤条件的歌曲数
pub async fn count_songs(pool: &Pool<Sqlite>, filters: &SongListQuery) -> Result<i64> {
    let mut query = SongQueryBuilder::count().with_filters(filters).build();
    let total: i64 = query.build_query_scalar().fetch_one(pool).await?;
    Ok(total)
}

/// 分页获取歌曲
pub async fn list_songs(
    pool: &Pool<Sqlite>,
    filters: &SongListQuery,
    limit: i64,
    offset: i64,
) -> Result<Vec<Song>> {
    let mut query = SongQueryBuilder::select()
        .with_filters(filters)
        .with_ordering(filters.ordering.as_deref())
        .with_pagination(limit, offset)
        .build();
    let songs: Vec<Song> = query.build_query_as().fetch_all(pool).await?;
    Ok(songs)
}

/// 根据ID获取歌曲
pub async fn get_song(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Song>> {
    let song: Option<Song> = sqlx::query_as("SELECT * FROM songs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(song)
}

/// 按歌名精确查找（可能有多首同名）
pub async fn find_songs_by_name(pool: &Pool<Sqlite>, name: &str) -> Result<Vec<Song>> {
    let songs: Vec<Song> = sqlx::query_as("SELECT * FROM songs WHERE song_name = ? ORDER BY id")
        .bind(name)
        .fetch_all(pool)
        .await?;
    Ok(songs)
}

/// 给歌曲附上曲风与标签名
pub async fn attach_meta(pool: &Pool<Sqlite>, songs: Vec<Song>) -> Result<Vec<SongView>> {
    if songs.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = songs.iter().map(|s| s.id).collect();
    let styles = names_by_song(
        pool,
        "SELECT ss.song_id, s.name FROM song_styles ss JOIN styles s ON s.id = ss.style_id WHERE ss.song_id IN (",
        &ids,
    )
    .await?;
    let tags = names_by_song(
        pool,
        "SELECT st.song_id, t.name FROM song_tags st JOIN tags t ON t.id = st.tag_id WHERE st.song_id IN (",
        &ids,
    )
    .await?;

    Ok(songs
        .into_iter()
        .map(|song| SongView {
            styles: styles.get(&song.id).cloned().unwrap_or_default(),
            tags: tags.get(&song.id).cloned().unwrap_or_default(),
            song,
        })
        .collect())
}

async fn names_by_song(
    pool: &Pool<Sqlite>,
    prefix: &str,
    ids: &[i64],
) -> Result<HashMap<i64, Vec<String>>> {
    let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(prefix);
    let mut separated = query.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY 2");

    let rows: Vec<(i64, String)> = query.build_query_as().fetch_all(pool).await?;
    let mut map: HashMap<i64, Vec<String>> = HashMap::new();
    for (song_id, name) in rows {
        map.entry(song_id).or_default().push(name);
    }
    Ok(map)
}

/// 创建歌曲
pub async fn create_song(
    pool: &Pool<Sqlite>,
    song_name: &str,
    singer: Option<&str>,
    language: Option<&str>,
) -> Result<Song> {
    let id = sqlx::query("INSERT INTO songs (song_name, singer, language, perform_count) VALUES (?, ?, ?, 0)")
        .bind(song_name.trim())
        .bind(singer)
        .bind(language)
        .execute(pool)
        .await?
        .last_insert_rowid();

    get_song(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Song {} vanished after insert", id))
}

pub async fn list_style_names(pool: &Pool<Sqlite>) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM styles ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(names)
}

pub async fn list_tag_names(pool: &Pool<Sqlite>) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM tags ORDER BY name")
        .fetch_all(pool)
        .await?;
    Ok(names)
}

pub async fn list_languages(pool: &Pool<Sqlite>) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar(
        "SELECT DISTINCT language FROM songs WHERE language IS NOT NULL AND language != '' ORDER BY language",
    )
    .fetch_all(pool)
    .await?;
    Ok(names)
}

/// 排行榜：按区间内的演唱次数排序
pub async fn top_songs(pool: &Pool<Sqlite>, since: Option<NaiveDate>, limit: i64) -> Result<Vec<TopSong>> {
    let songs: Vec<TopSong> = match since {
        Some(since) => {
            sqlx::query_as(
                r#"SELECT s.id, s.song_name, s.singer, COUNT(r.id) AS perform_count,
                          s.first_perform, s.last_performed
                   FROM songs s JOIN song_records r ON r.song_id = s.id
                   WHERE r.performed_at >= ?
                   GROUP BY s.id
                   ORDER BY perform_count DESC, s.last_performed DESC
                   LIMIT ?"#,
            )
            .bind(since)
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                r#"SELECT s.id, s.song_name, s.singer, COUNT(r.id) AS perform_count,
                          s.first_perform, s.last_performed
                   FROM songs s LEFT JOIN song_records r ON r.song_id = s.id
                   GROUP BY s.id
                   ORDER BY perform_count DESC, s.last_performed DESC
                   LIMIT ?"#,
            )
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(songs)
}

pub async fn random_song(pool: &Pool<Sqlite>) -> Result<Option<Song>> {
    let song: Option<Song> = sqlx::query_as("SELECT * FROM songs ORDER BY RANDOM() LIMIT 1")
        .fetch_optional(pool)
        .await?;
    Ok(song)
}

// ============ SongRecord ============

pub async fn count_records(pool: &Pool<Sqlite>, song_id: i64) -> Result<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM song_records WHERE song_id = ?")
        .bind(song_id)
        .fetch_one(pool)
        .await?;
    Ok(total)
}

/// 演唱记录（新的在前）
pub async fn list_records(pool: &Pool<Sqlite>, song_id: i64, limit: i64, offset: i64) -> Result<Vec<SongRecord>> {
    let records: Vec<SongRecord> = sqlx::query_as(
        "SELECT * FROM song_records WHERE song_id = ? ORDER BY performed_at DESC, id DESC LIMIT ? OFFSET ?",
    )
    .bind(song_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(records)
}

pub async fn get_record(pool: &Pool<Sqlite>, id: i64) -> Result<Option<SongRecord>> {
    let record: Option<SongRecord> = sqlx::query_as("SELECT * FROM song_records WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(record)
}

/// 查找某首歌在某天的记录
pub async fn find_record(pool: &Pool<Sqlite>, song_id: i64, date: NaiveDate) -> Result<Option<SongRecord>> {
    let record: Option<SongRecord> = sqlx::query_as(
        "SELECT * FROM song_records WHERE song_id = ? AND performed_at = ? ORDER BY id LIMIT 1",
    )
    .bind(song_id)
    .bind(date)
    .fetch_optional(pool)
    .await?;
    Ok(record)
}

/// 某天的全部记录及歌名（按歌名排序）
pub async fn records_on_date(pool: &Pool<Sqlite>, date: NaiveDate) -> Result<Vec<(SongRecord, String)>> {
    #[derive(sqlx::FromRow)]
    struct Row {
        #[sqlx(flatten)]
        record: SongRecord,
        song_name: String,
    }

    let rows: Vec<Row> = sqlx::query_as(
        r#"SELECT r.*, s.song_name FROM song_records r JOIN songs s ON s.id = r.song_id
           WHERE r.performed_at = ? ORDER BY s.song_name, r.id"#,
    )
    .bind(date)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|r| (r.record, r.song_name)).collect())
}

/// 新增记录并刷新歌曲统计
pub async fn create_record(
    pool: &Pool<Sqlite>,
    song_id: i64,
    performed_at: NaiveDate,
    url: Option<&str>,
    notes: Option<&str>,
    cover_url: Option<&str>,
) -> Result<SongRecord> {
    let id = sqlx::query(
        "INSERT INTO song_records (song_id, performed_at, url, notes, cover_url) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(song_id)
    .bind(performed_at)
    .bind(url)
    .bind(notes)
    .bind(cover_url)
    .execute(pool)
    .await?
    .last_insert_rowid();

    refresh_song_stats(pool, song_id).await?;

    get_record(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Record {} vanished after insert", id))
}

/// 删除记录并刷新歌曲统计，返回被删记录
pub async fn delete_record(pool: &Pool<Sqlite>, id: i64) -> Result<Option<SongRecord>> {
    let Some(record) = get_record(pool, id).await? else {
        return Ok(None);
    };

    sqlx::query("DELETE FROM song_records WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    refresh_song_stats(pool, record.song_id).await?;
    Ok(Some(record))
}

const REFRESH_STATS_SQL: &str = r#"
    UPDATE songs SET
        perform_count = (SELECT COUNT(*) FROM song_records r WHERE r.song_id = songs.id),
        first_perform = (SELECT MIN(performed_at) FROM song_records r WHERE r.song_id = songs.id),
        last_performed = (SELECT MAX(performed_at) FROM song_records r WHERE r.song_id = songs.id)
"#;

/// 从演唱记录重新计算 perform_count / first_perform / last_performed
pub async fn refresh_song_stats<'e, E>(executor: E, song_id: i64) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{} WHERE id = ?", REFRESH_STATS_SQL);
    sqlx::query(&sql).bind(song_id).execute(executor).await?;
    Ok(())
}

/// 重新计算全部歌曲统计
pub async fn rebuild_all_song_stats(pool: &Pool<Sqlite>) -> Result<u64> {
    let result = sqlx::query(REFRESH_STATS_SQL).execute(pool).await?;
    Ok(result.rows_affected())
}

// ============ 曲风 / 标签 ============

/// 获取或创建曲风
pub async fn ensure_style(pool: &Pool<Sqlite>, name: &str) -> Result<i64> {
    sqlx::query("INSERT OR IGNORE INTO styles (name) VALUES (?)")
        .bind(name.trim())
        .execute(pool)
        .await?;
    let id: i64 = sqlx::query_scalar("SELECT id FROM styles WHERE name = ?")
        .bind(name.trim())
        .fetch_one(pool)
        .await?;
    Ok(id)
}

/// 获取或创建标签
pub async fn ensure_tag(pool: &Pool<Sqlite>, name: &str) -> Result<i64> {
    sqlx::query("INSERT OR IGNORE INTO tags (name) VALUES (?)")
        .bind(name.trim())
        .execute(pool)
        .await?;
    let id: i64 = sqlx::query_scalar("SELECT id FROM tags WHERE name = ?")
        .bind(name.trim())
        .fetch_one(pool)
        .await?;
    Ok(id)
}

/// 关联曲风，已存在的关联忽略；返回新增数
pub async fn add_style(pool: &Pool<Sqlite>, song_id: i64, style_id: i64) -> Result<u64> {
    let result = sqlx::query("INSERT OR IGNORE INTO song_styles (song_id, style_id) VALUES (?, ?)")
        .bind(song_id)
        .bind(style_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// 关联标签，已存在的关联忽略；返回新增数
pub async fn add_tag(pool: &Pool<Sqlite>, song_id: i64, tag_id: i64) -> Result<u64> {
    let result = sqlx::query("INSERT OR IGNORE INTO song_tags (song_id, tag_id) VALUES (?, ?)")
        .bind(song_id)
        .bind(tag_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// ============ 合并 ============

/// 把 `sources` 并入 `target`：记录、曲风、标签、推荐关联全部迁移，源歌曲删除
///
/// 返回迁移的记录数。统计字段按记录重算。
pub async fn merge_songs(pool: &Pool<Sqlite>, target: i64, sources: &[i64]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut moved = 0;

    for &source in sources.iter().filter(|&&s| s != target) {
        moved += sqlx::query("UPDATE song_records SET song_id = ? WHERE song_id = ?")
            .bind(target)
            .bind(source)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query(
            "INSERT OR IGNORE INTO song_styles (song_id, style_id) SELECT ?, style_id FROM song_styles WHERE song_id = ?",
        )
        .bind(target)
        .bind(source)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO song_tags (song_id, tag_id) SELECT ?, tag_id FROM song_tags WHERE song_id = ?",
        )
        .bind(target)
        .bind(source)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT OR IGNORE INTO recommendation_songs (recommendation_id, song_id)
               SELECT recommendation_id, ? FROM recommendation_songs WHERE song_id = ?"#,
        )
        .bind(target)
        .bind(source)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM songs WHERE id = ?")
            .bind(source)
            .execute(&mut *tx)
            .await?;
    }

    refresh_song_stats(&mut *tx, target).await?;
    tx.commit().await?;
    Ok(moved)
}

// ============ 原创作品 ============

/// 精选优先，其次按发布日期倒序
pub async fn list_original_works(pool: &Pool<Sqlite>) -> Result<Vec<OriginalWork>> {
    let works: Vec<OriginalWork> =
        sqlx::query_as("SELECT * FROM original_works ORDER BY featured DESC, release_date DESC, id DESC")
            .fetch_all(pool)
            .await?;
    Ok(works)
}
