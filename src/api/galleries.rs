use axum::{
    extract::{Multipart, Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::error::{ApiError, ApiResult};
use super::response::{created, success, success_message};
use super::AppState;
use crate::models::{CreateGalleryRequest, UpdateGalleryRequest, Validator};

#[derive(Debug, Deserialize)]
pub struct ThumbnailQuery {
    pub path: Option<String>,
}

/// multipart 中的上传文件与可选文件名
struct Upload {
    data: Vec<u8>,
    upload_name: String,
    filename: Option<String>,
}

async fn read_upload(mut multipart: Multipart) -> ApiResult<Upload> {
    let mut data = None;
    let mut upload_name = String::new();
    let mut filename = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidParameter(format!("上传数据无效: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                upload_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidParameter(format!("读取上传文件失败: {}", e)))?;
                data = Some(bytes.to_vec());
            }
            "filename" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::InvalidParameter(format!("读取文件名失败: {}", e)))?;
                filename = Some(text).filter(|t| !t.trim().is_empty());
            }
            _ => {}
        }
    }

    let data = data.ok_or_else(|| ApiError::field("file", "缺少上传文件"))?;
    if data.is_empty() {
        return Err(ApiError::field("file", "上传文件为空"));
    }
    Ok(Upload { data, upload_name, filename })
}

/// GET /api/gallery/tree
pub async fn gallery_tree(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.galleries.tree().await?))
}

/// GET /api/gallery/:id - 详情（含面包屑与直接子图集）
pub async fn gallery_detail(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.galleries.detail(&id).await?))
}

/// GET /api/gallery/:id/images
pub async fn gallery_images(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    let images = state.galleries.images(&id).await?;
    Ok(success(json!({ "total": images.len(), "images": images })))
}

/// GET /api/gallery/:id/children-images
pub async fn children_images(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.galleries.children_images(&id).await?))
}

/// GET /api/gallery/thumbnail?path= - 按需生成缩略图
pub async fn thumbnail(
    State(state): State<AppState>,
    Query(query): Query<ThumbnailQuery>,
) -> ApiResult<impl IntoResponse> {
    let path = query
        .path
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidParameter("缺少 path 参数".to_string()))?;

    let thumbnail_url = state.thumbnails.thumbnail_url(&path).await;
    Ok(success(json!({
        "original_url": path,
        "thumbnail_url": thumbnail_url,
    })))
}

/// POST /api/admin/gallery
pub async fn create_gallery(
    State(state): State<AppState>,
    Json(payload): Json<CreateGalleryRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    let gallery = state.galleries.create_gallery(&payload).await?;
    info!("创建图集: {} ({})", gallery.title, gallery.id);
    Ok(created(gallery))
}

/// PUT /api/admin/gallery/:id - 部分更新；`parent_id` 为 null 时移到根
pub async fn update_gallery(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateGalleryRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate()?;
    Ok(success(state.galleries.update_gallery(&id, &payload).await?))
}

/// DELETE /api/admin/gallery/:id
pub async fn delete_gallery(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    if !state.galleries.delete_gallery(&id).await? {
        return Err(ApiError::NotFound(format!("图集不存在: {}", id)));
    }
    Ok(success_message("图集已删除"))
}

/// POST /api/admin/gallery/:id/images - multipart `file`，可选 `filename`
pub async fn upload_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let upload = read_upload(multipart).await?;
    let filename = state
        .galleries
        .add_image(&id, &upload.data, &upload.upload_name, upload.filename.as_deref())
        .await?;
    info!("图集 {} 新增图片: {}", id, filename);
    Ok(created(json!({ "filename": filename })))
}

/// DELETE /api/admin/gallery/:id/images/:filename
pub async fn delete_image(
    State(state): State<AppState>,
    Path((id, filename)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    if !state.galleries.delete_image(&id, &filename).await? {
        return Err(ApiError::NotFound(format!("图片不存在: {}", filename)));
    }
    Ok(success_message("图片已删除"))
}

/// PUT /api/admin/gallery/:id/cover
pub async fn update_cover(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let upload = read_upload(multipart).await?;
    let cover_url = state.galleries.update_cover(&id, &upload.data).await?;
    Ok(success(json!({ "cover_url": cover_url })))
}

/// POST /api/admin/gallery/:id/refresh-count
pub async fn refresh_count(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.galleries.refresh_detail(&id).await?))
}

/// POST /api/admin/gallery/sync - 从目录同步图集
pub async fn sync_galleries(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let report = state.galleries.sync_from_folder().await?;
    info!("图集同步完成: 新增 {}, 更新 {}", report.created, report.updated);
    Ok(success(report))
}
