pub mod admin;
pub mod collections;
pub mod error;
pub mod followers;
pub mod galleries;
pub mod health;
pub mod livestreams;
pub mod response;
pub mod settings;
pub mod songs;

use axum::{
    extract::{DefaultBodyLimit, Request, State},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post, put},
    Router,
};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::AppConfig;
use crate::database::Database;
use crate::external::bilibili::{BilibiliClient, VideoMetadataSource};
use crate::services::{
    ApiCache, BilibiliImporter, CoverDownloader, CoverStore, FollowerService, GalleryService, LivestreamService,
    SongService, ThumbnailGenerator,
};
use error::{ApiError, ApiResult};

/// 管理接口令牌请求头
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// 上传接口请求体上限
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub config: Arc<AppConfig>,
    pub cache: ApiCache,
    pub songs: SongService,
    pub galleries: Arc<GalleryService>,
    pub thumbnails: ThumbnailGenerator,
    pub livestreams: LivestreamService,
    pub followers: FollowerService,
    pub bilibili: BilibiliClient,
    pub importer: Arc<BilibiliImporter>,
}

impl AppState {
    pub fn new(database: Database, config: AppConfig) -> anyhow::Result<Self> {
        let bilibili = BilibiliClient::new(&config.bilibili)?;
        let covers = CoverDownloader::new(bilibili.http().clone(), config.media_root.clone(), &config.bilibili);
        Ok(Self::with_sources(database, config, bilibili.clone(), Arc::new(bilibili), Arc::new(covers)))
    }

    /// 指定导入器使用的元数据来源与封面存储
    pub fn with_sources(
        database: Database,
        config: AppConfig,
        bilibili: BilibiliClient,
        source: Arc<dyn VideoMetadataSource>,
        covers: Arc<dyn CoverStore>,
    ) -> Self {
        let pool = database.pool().clone();
        let cache = ApiCache::new(config.cache_max_entries);
        let thumbnails = ThumbnailGenerator::new(config.media_root.clone());

        Self {
            songs: SongService::new(pool.clone(), cache.clone()),
            galleries: Arc::new(GalleryService::new(pool.clone(), config.media_root.clone(), thumbnails.clone())),
            livestreams: LivestreamService::new(pool.clone(), thumbnails.clone(), config.livestream.clone()),
            followers: FollowerService::new(pool.clone()),
            importer: Arc::new(BilibiliImporter::new(pool, source, covers)),
            thumbnails,
            cache,
            bilibili,
            config: Arc::new(config),
            database,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/health", get(health::health_check))
        // Songs
        .route("/api/songs", get(songs::list_songs))
        .route("/api/songs/:id", get(songs::get_song))
        .route("/api/songs/:id/records", get(songs::get_song_records))
        .route("/api/styles", get(songs::list_styles))
        .route("/api/tags", get(songs::list_tags))
        .route("/api/languages", get(songs::list_languages))
        .route("/api/top-songs", get(songs::top_songs))
        .route("/api/random-song", get(songs::random_song))
        .route("/api/original-works", get(songs::original_works))
        // Gallery
        .route("/api/gallery/tree", get(galleries::gallery_tree))
        .route("/api/gallery/thumbnail", get(galleries::thumbnail))
        .route("/api/gallery/:id", get(galleries::gallery_detail))
        .route("/api/gallery/:id/images", get(galleries::gallery_images))
        .route("/api/gallery/:id/children-images", get(galleries::children_images))
        // Fan works
        .route("/api/fansdiy/collections", get(collections::list_collections))
        .route("/api/fansdiy/collections/:id", get(collections::get_collection))
        .route("/api/fansdiy/works", get(collections::list_works))
        .route("/api/fansdiy/works/:id", get(collections::get_work))
        // Livestreams
        .route("/api/livestreams", get(livestreams::list_livestreams))
        .route("/api/livestreams/:date", get(livestreams::get_livestream))
        // Site settings
        .route("/api/site-settings/settings", get(settings::get_settings))
        .route("/api/site-settings/recommendation", get(settings::get_recommendation))
        .route("/api/site-settings/milestones", get(settings::list_milestones))
        // Followers
        .route("/api/data-analytics/followers/accounts", get(followers::list_accounts))
        .route("/api/data-analytics/followers/:account_id", get(followers::account_history));

    let admin = Router::new()
        .route("/api/admin/songs", post(admin::create_song))
        .route("/api/admin/songs/merge", post(admin::merge_songs))
        .route("/api/admin/songs/batch-tag", post(admin::batch_tag))
        .route("/api/admin/records", post(admin::create_record))
        .route("/api/admin/records/:id", delete(admin::delete_record))
        .route("/api/admin/import-bv", post(admin::import_bv))
        .route("/api/admin/cache/clear", post(admin::clear_cache))
        .route("/api/admin/gallery", post(galleries::create_gallery))
        .route("/api/admin/gallery/sync", post(galleries::sync_galleries))
        .route(
            "/api/admin/gallery/:id",
            put(galleries::update_gallery).delete(galleries::delete_gallery),
        )
        .route("/api/admin/gallery/:id/images", post(galleries::upload_image))
        .route("/api/admin/gallery/:id/images/:filename", delete(galleries::delete_image))
        .route("/api/admin/gallery/:id/cover", put(galleries::update_cover))
        .route("/api/admin/gallery/:id/refresh-count", post(galleries::refresh_count))
        .route("/api/admin/fansdiy/collections", post(collections::create_collection))
        .route("/api/admin/fansdiy/works", post(collections::create_work))
        .route("/api/admin/fansdiy/works/:id", delete(collections::delete_work))
        .route("/api/admin/livestreams", post(livestreams::create_livestream))
        .route(
            "/api/admin/livestreams/:date",
            put(livestreams::update_livestream).delete(livestreams::delete_livestream),
        )
        .route("/api/admin/site-settings", put(settings::update_settings))
        .route("/api/admin/milestones", post(settings::create_milestone))
        .route("/api/admin/recommendations", post(settings::create_recommendation))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .route("/", get(|| async { "Fans Home Backend API v1.0" }))
        .merge(public)
        .merge(admin)
        .nest_service("/media", ServeDir::new(&state.config.media_root))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// 校验 `X-Admin-Token`；未配置令牌时拒绝所有管理请求
async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> ApiResult<Response> {
    let Some(expected) = state.config.admin_token.as_deref() else {
        return Err(ApiError::Forbidden("管理接口未启用".to_string()));
    };

    let provided = request
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    // 按摘要比较
    if Sha256::digest(provided.as_bytes()) != Sha256::digest(expected.as_bytes()) {
        tracing::warn!("管理接口令牌校验失败: {} {}", request.method(), request.uri().path());
        return Err(ApiError::Forbidden("无效的管理令牌".to_string()));
    }

    Ok(next.run(request).await)
}
