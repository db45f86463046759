use anyhow::Result;
use sqlx::{Pool, Sqlite};

use crate::models::{Collection, CreateCollectionRequest, CreateWorkRequest, Work};

const WORK_SELECT: &str = r#"SELECT w.id, w.collection_id, c.name AS collection_name, w.title, w.cover_url,
                                    w.view_url, w.author, w.notes, w.display_order, w.position
                             FROM diy_works w JOIN diy_collections c ON c.id = w.collection_id"#;

// ============ Collection ============

pub async fn count_collections(pool: &Pool<Sqlite>) -> Result<i64> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM diy_collections")
        .fetch_one(pool)
        .await?;
    Ok(total)
}

pub async fn list_collections(pool: &Pool<Sqlite>, limit: i64, offset: i64) -> Result<Vec<Collection>> {
    let collections: Vec<Collection> = sqlx::query_as(
        "SELECT * FROM diy_collections ORDER BY position, display_order, created_at DESC, id DESC LIMIT ? OFFSET ?",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(collections)
}

pub async fn get_collection(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Collection>> {
    let collection: Option<Collection> = sqlx::query_as("SELECT * FROM diy_collections WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(collection)
}

pub async fn create_collection(pool: &Pool<Sqlite>, req: &CreateCollectionRequest) -> Result<Collection> {
    let id = sqlx::query(
        r#"INSERT INTO diy_collections (name, works_count, display_order, position, created_at, updated_at)
           VALUES (?, 0, ?, ?, datetime('now'), datetime('now'))"#,
    )
    .bind(req.name.trim())
    .bind(req.display_order)
    .bind(req.position)
    .execute(pool)
    .await?
    .last_insert_rowid();

    get_collection(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Collection {} vanished after insert", id))
}

/// 按实际作品数刷新 works_count
pub async fn refresh_works_count(pool: &Pool<Sqlite>, collection_id: i64) -> Result<()> {
    sqlx::query(
        r#"UPDATE diy_collections
           SET works_count = (SELECT COUNT(*) FROM diy_works WHERE collection_id = diy_collections.id),
               updated_at = datetime('now')
           WHERE id = ?"#,
    )
    .bind(collection_id)
    .execute(pool)
    .await?;
    Ok(())
}

// ============ Work ============

pub async fn count_works(pool: &Pool<Sqlite>, collection_id: Option<i64>) -> Result<i64> {
    let total: i64 = match collection_id {
        Some(cid) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM diy_works WHERE collection_id = ?")
                .bind(cid)
                .fetch_one(pool)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT COUNT(*) FROM diy_works")
                .fetch_one(pool)
                .await?
        }
    };
    Ok(total)
}

pub async fn list_works(
    pool: &Pool<Sqlite>,
    collection_id: Option<i64>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Work>> {
    let order = "ORDER BY w.position, w.display_order, w.id DESC LIMIT ? OFFSET ?";
    let works: Vec<Work> = match collection_id {
        Some(cid) => {
            let sql = format!("{} WHERE w.collection_id = ? {}", WORK_SELECT, order);
            sqlx::query_as(&sql)
                .bind(cid)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql = format!("{} {}", WORK_SELECT, order);
            sqlx::query_as(&sql)
                .bind(limit)
                .bind(offset)
                .fetch_all(pool)
                .await?
        }
    };
    Ok(works)
}

pub async fn get_work(pool: &Pool<Sqlite>, id: i64) -> Result<Option<Work>> {
    let sql = format!("{} WHERE w.id = ?", WORK_SELECT);
    let work: Option<Work> = sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?;
    Ok(work)
}

/// 新增作品并刷新合集作品数
pub async fn create_work(pool: &Pool<Sqlite>, req: &CreateWorkRequest) -> Result<Work> {
    let id = sqlx::query(
        r#"INSERT INTO diy_works (collection_id, title, cover_url, view_url, author, notes, display_order, position)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(req.collection_id)
    .bind(req.title.trim())
    .bind(&req.cover_url)
    .bind(&req.view_url)
    .bind(req.author.trim())
    .bind(&req.notes)
    .bind(req.display_order)
    .bind(req.position)
    .execute(pool)
    .await?
    .last_insert_rowid();

    refresh_works_count(pool, req.collection_id).await?;

    get_work(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Work {} vanished after insert", id))
}

/// 删除作品并刷新合集作品数，返回是否存在
pub async fn delete_work(pool: &Pool<Sqlite>, id: i64) -> Result<bool> {
    let Some(work) = get_work(pool, id).await? else {
        return Ok(false);
    };

    sqlx::query("DELETE FROM diy_works WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    refresh_works_count(pool, work.collection_id).await?;
    Ok(true)
}
