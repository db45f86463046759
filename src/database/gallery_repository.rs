use anyhow::Result;
use sqlx::{Pool, Sqlite};

use crate::models::{Gallery, GalleryTree, UpdateGalleryRequest};

/// 全部图集（排序：sort_order, id）
pub async fn list_galleries(pool: &Pool<Sqlite>) -> Result<Vec<Gallery>> {
    let galleries: Vec<Gallery> = sqlx::query_as("SELECT * FROM gallery ORDER BY sort_order, id")
        .fetch_all(pool)
        .await?;
    Ok(galleries)
}

/// 载入整棵树
pub async fn load_tree(pool: &Pool<Sqlite>) -> Result<GalleryTree> {
    Ok(GalleryTree::new(list_galleries(pool).await?))
}

pub async fn get_gallery(pool: &Pool<Sqlite>, id: &str) -> Result<Option<Gallery>> {
    let gallery: Option<Gallery> = sqlx::query_as("SELECT * FROM gallery WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(gallery)
}

/// 新建图集
pub async fn insert_gallery(pool: &Pool<Sqlite>, gallery: &Gallery) -> Result<()> {
    sqlx::query(
        r#"INSERT INTO gallery (id, title, description, cover_url, parent_id, level, image_count,
                                folder_path, tags, sort_order, is_active, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'), datetime('now'))"#,
    )
    .bind(&gallery.id)
    .bind(&gallery.title)
    .bind(&gallery.description)
    .bind(&gallery.cover_url)
    .bind(&gallery.parent_id)
    .bind(gallery.level)
    .bind(gallery.image_count)
    .bind(&gallery.folder_path)
    .bind(&gallery.tags)
    .bind(gallery.sort_order)
    .bind(gallery.is_active)
    .execute(pool)
    .await?;
    Ok(())
}

/// 目录同步用：存在则更新目录派生的字段（标签与排序保留），否则插入。返回是否新建
pub async fn upsert_from_folder(pool: &Pool<Sqlite>, gallery: &Gallery) -> Result<bool> {
    let existed = get_gallery(pool, &gallery.id).await?.is_some();

    sqlx::query(
        r#"INSERT INTO gallery (id, title, description, cover_url, parent_id, level, image_count,
                                folder_path, tags, sort_order, is_active, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, '[]', 0, 1, datetime('now'), datetime('now'))
           ON CONFLICT(id) DO UPDATE SET
               title = excluded.title,
               description = excluded.description,
               cover_url = excluded.cover_url,
               parent_id = excluded.parent_id,
               level = excluded.level,
               image_count = excluded.image_count,
               folder_path = excluded.folder_path,
               is_active = 1,
               updated_at = datetime('now')"#,
    )
    .bind(&gallery.id)
    .bind(&gallery.title)
    .bind(&gallery.description)
    .bind(&gallery.cover_url)
    .bind(&gallery.parent_id)
    .bind(gallery.level)
    .bind(gallery.image_count)
    .bind(&gallery.folder_path)
    .execute(pool)
    .await?;

    Ok(!existed)
}

/// 更新可编辑字段（不含父节点，父节点走 `set_parent`）
pub async fn update_gallery_fields(pool: &Pool<Sqlite>, id: &str, req: &UpdateGalleryRequest) -> Result<()> {
    let mut query: sqlx::QueryBuilder<Sqlite> = sqlx::QueryBuilder::new("UPDATE gallery SET updated_at = datetime('now')");

    if let Some(ref title) = req.title {
        query.push(", title = ").push_bind(title.trim().to_string());
    }
    if let Some(ref description) = req.description {
        query.push(", description = ").push_bind(description.clone());
    }
    if let Some(ref tags) = req.tags {
        query.push(", tags = ").push_bind(serde_json::to_string(tags)?);
    }
    if let Some(sort_order) = req.sort_order {
        query.push(", sort_order = ").push_bind(sort_order);
    }
    if let Some(is_active) = req.is_active {
        query.push(", is_active = ").push_bind(is_active);
    }

    query.push(" WHERE id = ").push_bind(id.to_string());
    query.build().execute(pool).await?;
    Ok(())
}

/// 修改父节点并批量写入子树层级
pub async fn set_parent(
    pool: &Pool<Sqlite>,
    id: &str,
    parent_id: Option<&str>,
    levels: &[(String, i64)],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("UPDATE gallery SET parent_id = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(parent_id)
        .bind(id)
        .execute(&mut *tx)
        .await?;

    for (gallery_id, level) in levels {
        sqlx::query("UPDATE gallery SET level = ? WHERE id = ?")
            .bind(level)
            .bind(gallery_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// 批量写入图片数量
pub async fn update_image_counts(pool: &Pool<Sqlite>, counts: &[(String, i64)]) -> Result<()> {
    let mut tx = pool.begin().await?;
    for (gallery_id, count) in counts {
        sqlx::query("UPDATE gallery SET image_count = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(count)
            .bind(gallery_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn set_cover_url(pool: &Pool<Sqlite>, id: &str, cover_url: &str) -> Result<()> {
    sqlx::query("UPDATE gallery SET cover_url = ?, updated_at = datetime('now') WHERE id = ?")
        .bind(cover_url)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// 删除图集（子图集级联删除），返回是否存在
pub async fn delete_gallery(pool: &Pool<Sqlite>, id: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM gallery WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
