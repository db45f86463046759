// 图集服务
//
// 图集与 `MEDIA_ROOT/gallery/...` 下的目录一一对应。数据库中的层级与图片数量是缓存值，
// 由本服务在图片增删、挂载变化与目录同步时维护。

use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::database::gallery_repository as repo;
use crate::models::{
    ChildImages, ChildrenImagesView, CreateGalleryRequest, Gallery, GalleryDetail, GalleryImage, GalleryTree,
    GalleryTreeNode, UpdateGalleryRequest,
};
use crate::services::thumbnail::ThumbnailGenerator;

pub const GALLERY_DIR: &str = "gallery";
pub const COVER_FILENAME: &str = "cover.jpg";
const MEDIA_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "mp4"];
const MAX_NAME_ATTEMPTS: u32 = 100;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("图集不存在: {0}")]
    NotFound(String),

    #[error("不能将 {parent} 设为 {id} 的父图集：会形成循环")]
    Cycle { id: String, parent: String },

    #[error("图集 {0} 不能以自身为父图集")]
    SelfParent(String),

    #[error("不能删除封面文件: {0}")]
    ProtectedFile(String),

    #[error("非法文件名: {0}")]
    InvalidFilename(String),

    #[error("已存在: {0}")]
    AlreadyExists(String),

    #[error("无法为图集 {0} 分配文件名")]
    NameExhausted(String),

    #[error("文件操作失败: {0}")]
    Io(#[from] std::io::Error),

    #[error("数据库错误: {0}")]
    Database(#[from] anyhow::Error),
}

pub type GalleryResult<T> = Result<T, GalleryError>;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
}

impl SyncReport {
    pub fn total(&self) -> usize {
        self.created + self.updated
    }
}

pub struct GalleryService {
    pool: Pool<Sqlite>,
    media_root: PathBuf,
    thumbnails: ThumbnailGenerator,
    /// 每个图集一把锁，只保护文件名分配
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl GalleryService {
    pub fn new(pool: Pool<Sqlite>, media_root: PathBuf, thumbnails: ThumbnailGenerator) -> Self {
        Self {
            pool,
            media_root,
            thumbnails,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn dir_of(&self, gallery: &Gallery) -> PathBuf {
        self.media_root.join(gallery.relative_dir())
    }

    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(id.to_string()).or_default().clone()
    }

    async fn require(&self, id: &str) -> GalleryResult<Gallery> {
        repo::get_gallery(&self.pool, id)
            .await?
            .ok_or_else(|| GalleryError::NotFound(id.to_string()))
    }

    /// 启用的图集，停用视为不存在
    async fn require_active(&self, id: &str) -> GalleryResult<Gallery> {
        let gallery = self.require(id).await?;
        if !gallery.is_active {
            return Err(GalleryError::NotFound(id.to_string()));
        }
        Ok(gallery)
    }

    // ============ 查询 ============

    pub async fn tree(&self) -> GalleryResult<Vec<GalleryTreeNode>> {
        Ok(repo::load_tree(&self.pool).await?.to_nested())
    }

    pub async fn detail(&self, id: &str) -> GalleryResult<GalleryDetail> {
        self.require_active(id).await?;
        let tree = repo::load_tree(&self.pool).await?;
        tree.detail(id).ok_or_else(|| GalleryError::NotFound(id.to_string()))
    }

    /// 重算图片数量并返回详情，停用的图集也可刷新
    pub async fn refresh_detail(&self, id: &str) -> GalleryResult<GalleryDetail> {
        self.refresh_image_count(id).await?;
        let tree = repo::load_tree(&self.pool).await?;
        tree.detail(id).ok_or_else(|| GalleryError::NotFound(id.to_string()))
    }

    pub async fn images(&self, id: &str) -> GalleryResult<Vec<GalleryImage>> {
        let gallery = self.require_active(id).await?;
        Ok(self.list_images(&gallery).await)
    }

    /// 目录中的图片（排除封面），按文件名排序；读目录失败时返回空列表
    pub async fn list_images(&self, gallery: &Gallery) -> Vec<GalleryImage> {
        let filenames = match media_files(&self.dir_of(gallery)).await {
            Ok(names) => names,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!("读取图集目录失败: {} - {}", gallery.folder_path, e);
                }
                return Vec::new();
            }
        };

        filenames
            .into_iter()
            .enumerate()
            .map(|(idx, filename)| GalleryImage {
                url: format!("{}{}", gallery.folder_path, filename),
                title: format!("{} - {}", gallery.title, idx + 1),
                filename,
            })
            .collect()
    }

    pub async fn children_images(&self, id: &str) -> GalleryResult<ChildrenImagesView> {
        let gallery = self.require_active(id).await?;
        let tree = repo::load_tree(&self.pool).await?;

        if tree.is_leaf(id) {
            let images = self.list_images(&gallery).await;
            return Ok(ChildrenImagesView::Leaf {
                gallery: gallery.summary(),
                total: images.len(),
                images,
            });
        }

        let children = self.all_children_images(&tree, id).await;
        let total_images = children.iter().map(|c| c.images.len()).sum();
        Ok(ChildrenImagesView::Parent {
            total_galleries: children.len(),
            total_images,
            children,
        })
    }

    /// 各子图集及其图片，没有图片的子图集不返回
    pub async fn all_children_images(&self, tree: &GalleryTree, id: &str) -> Vec<ChildImages> {
        let mut result = Vec::new();
        for child in tree.children(id) {
            let images = self.list_images(child).await;
            if !images.is_empty() {
                result.push(ChildImages {
                    gallery: child.summary(),
                    images,
                });
            }
        }
        result
    }

    // ============ 图片 ============

    /// 添加图片，返回最终文件名
    ///
    /// 未指定文件名时分配下一个数字编号（`001.jpg`、`002.png`……），扩展名取自上传文件。
    /// 编号分配在图集锁内进行，并以独占创建落盘；创建冲突视为竞争，换下一个编号重试。
    pub async fn add_image(
        &self,
        id: &str,
        data: &[u8],
        upload_name: &str,
        filename: Option<&str>,
    ) -> GalleryResult<String> {
        let gallery = self.require(id).await?;
        let dir = self.dir_of(&gallery);
        fs::create_dir_all(&dir).await?;

        let filename = match filename.map(str::trim).filter(|f| !f.is_empty()) {
            Some(name) => {
                if name == COVER_FILENAME {
                    return Err(GalleryError::ProtectedFile(name.to_string()));
                }
                validate_filename(name)?;
                let mut file = create_exclusive(&dir.join(name))
                    .await?
                    .ok_or_else(|| GalleryError::AlreadyExists(name.to_string()))?;
                file.write_all(data).await?;
                file.flush().await?;
                name.to_string()
            }
            None => {
                let ext = upload_extension(upload_name);
                let lock = self.lock_for(id);
                let _guard = lock.lock().await;

                let mut floor = 0u32;
                let mut allocated = None;
                for attempt in 1..=MAX_NAME_ATTEMPTS {
                    let Some(next) = max_numeric_stem(&dir).await?.max(floor).checked_add(1) else {
                        warn!("图集 {} 数字编号已用尽", id);
                        break;
                    };
                    floor = next;
                    let candidate = format!("{:03}{}", next, ext);

                    match create_exclusive(&dir.join(&candidate)).await? {
                        Some(mut file) => {
                            file.write_all(data).await?;
                            file.flush().await?;
                            allocated = Some(candidate);
                            break;
                        }
                        None => {
                            warn!("图集 {} 文件名冲突 {} (尝试 {}/{})", id, candidate, attempt, MAX_NAME_ATTEMPTS);
                        }
                    }
                }
                allocated.ok_or_else(|| GalleryError::NameExhausted(id.to_string()))?
            }
        };

        debug!("图集 {} 新增图片 {}", id, filename);
        self.refresh_image_count(id).await?;
        Ok(filename)
    }

    /// 删除图片及其缩略图，返回是否删除了文件
    pub async fn delete_image(&self, id: &str, filename: &str) -> GalleryResult<bool> {
        if filename == COVER_FILENAME {
            return Err(GalleryError::ProtectedFile(filename.to_string()));
        }
        validate_filename(filename)?;

        let gallery = self.require(id).await?;
        match fs::remove_file(self.dir_of(&gallery).join(filename)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        self.thumbnails
            .delete_thumbnail(&format!("{}/{}", gallery.relative_dir(), filename));
        self.refresh_image_count(id).await?;
        Ok(true)
    }

    /// 替换封面：写临时文件后重命名，返回新的 cover_url
    pub async fn update_cover(&self, id: &str, data: &[u8]) -> GalleryResult<String> {
        let gallery = self.require(id).await?;
        let dir = self.dir_of(&gallery);
        fs::create_dir_all(&dir).await?;

        let tmp = dir.join(format!(".cover-{}.tmp", uuid::Uuid::new_v4()));
        if let Err(e) = fs::write(&tmp, data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, dir.join(COVER_FILENAME)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        let cover_url = format!("{}{}", gallery.folder_path, COVER_FILENAME);
        repo::set_cover_url(&self.pool, id, &cover_url).await?;
        self.thumbnails
            .delete_thumbnail(&format!("{}/{}", gallery.relative_dir(), COVER_FILENAME));
        Ok(cover_url)
    }

    // ============ 图片数量 ============

    /// 重算自身与全部后代的图片数量，再沿祖先链向上汇总，一次事务写入
    pub async fn refresh_image_count(&self, id: &str) -> GalleryResult<()> {
        let tree = repo::load_tree(&self.pool).await?;
        if !tree.contains(id) {
            return Err(GalleryError::NotFound(id.to_string()));
        }

        let mut leaf_counts: HashMap<String, i64> = HashMap::new();
        let root = tree.get(id).into_iter();
        for g in root.chain(tree.descendants(id)) {
            if tree.is_leaf(&g.id) {
                leaf_counts.insert(g.id.clone(), self.count_images(g).await);
            }
        }

        let subtree = tree.aggregate_counts(id, |g| leaf_counts.get(&g.id).copied().unwrap_or(0));

        let mut current: HashMap<String, i64> = subtree.iter().cloned().collect();
        let mut updates = subtree;
        for ancestor in tree.ancestors(id) {
            let total = tree
                .children(&ancestor.id)
                .iter()
                .map(|c| current.get(&c.id).copied().unwrap_or(c.image_count))
                .sum();
            current.insert(ancestor.id.clone(), total);
            updates.push((ancestor.id.clone(), total));
        }

        repo::update_image_counts(&self.pool, &updates).await?;
        Ok(())
    }

    /// 刷新所有根图集
    pub async fn refresh_all_counts(&self) -> GalleryResult<usize> {
        let tree = repo::load_tree(&self.pool).await?;
        let roots: Vec<String> = tree.roots().map(|g| g.id.clone()).collect();
        for root in &roots {
            self.refresh_image_count(root).await?;
        }
        Ok(tree.len())
    }

    async fn count_images(&self, gallery: &Gallery) -> i64 {
        media_files(&self.dir_of(gallery))
            .await
            .map(|files| files.len() as i64)
            .unwrap_or(0)
    }

    // ============ 结构 ============

    /// 校验并修改父节点，重算子树层级与新旧两条祖先链的图片数量
    pub async fn set_parent(&self, id: &str, parent_id: Option<&str>) -> GalleryResult<()> {
        let tree = repo::load_tree(&self.pool).await?;
        let gallery = tree.get(id).ok_or_else(|| GalleryError::NotFound(id.to_string()))?;
        let old_parent = gallery.parent_id.clone();

        let root_level = match parent_id {
            None => 0,
            Some(parent) => {
                if parent == id {
                    return Err(GalleryError::SelfParent(id.to_string()));
                }
                let parent_gallery = tree
                    .get(parent)
                    .ok_or_else(|| GalleryError::NotFound(parent.to_string()))?;
                if tree.would_create_cycle(id, parent) {
                    return Err(GalleryError::Cycle {
                        id: id.to_string(),
                        parent: parent.to_string(),
                    });
                }
                parent_gallery.level + 1
            }
        };

        let levels = tree.subtree_levels(id, root_level);
        repo::set_parent(&self.pool, id, parent_id, &levels).await?;
        info!("图集 {} 挂载到 {:?}", id, parent_id);

        self.refresh_image_count(id).await?;
        if let Some(old) = old_parent.filter(|old| Some(old.as_str()) != parent_id) {
            if repo::get_gallery(&self.pool, &old).await?.is_some() {
                self.refresh_image_count(&old).await?;
            }
        }
        Ok(())
    }

    pub async fn create_gallery(&self, req: &CreateGalleryRequest) -> GalleryResult<Gallery> {
        let relative = format!("{}/{}", GALLERY_DIR, req.folder.trim_matches('/'));
        let id = Gallery::id_from_relative_path(&relative);
        if repo::get_gallery(&self.pool, &id).await?.is_some() {
            return Err(GalleryError::AlreadyExists(id));
        }

        let level = match req.parent_id.as_deref() {
            Some(parent) => self.require(parent).await?.level + 1,
            None => 0,
        };

        let mut gallery = Gallery::new(&id, req.title.trim(), Gallery::folder_path_from_relative(&relative));
        gallery.description = req.description.clone();
        gallery.parent_id = req.parent_id.clone();
        gallery.level = level;
        gallery.sort_order = req.sort_order;
        gallery.tags = serde_json::to_string(&req.tags).map_err(anyhow::Error::from)?;

        let dir = self.dir_of(&gallery);
        fs::create_dir_all(&dir).await?;
        if fs::try_exists(dir.join(COVER_FILENAME)).await.unwrap_or(false) {
            gallery.cover_url = format!("{}{}", gallery.folder_path, COVER_FILENAME);
        }

        repo::insert_gallery(&self.pool, &gallery).await?;
        self.refresh_image_count(&id).await?;
        self.require(&id).await
    }

    pub async fn update_gallery(&self, id: &str, req: &UpdateGalleryRequest) -> GalleryResult<Gallery> {
        let gallery = self.require(id).await?;

        if let Some(ref parent) = req.parent_id {
            if parent.as_deref() != gallery.parent_id.as_deref() {
                self.set_parent(id, parent.as_deref()).await?;
            }
        }

        repo::update_gallery_fields(&self.pool, id, req).await?;
        self.require(id).await
    }

    /// 删除图集与全部后代（目录保留），返回是否存在
    pub async fn delete_gallery(&self, id: &str) -> GalleryResult<bool> {
        let Some(gallery) = repo::get_gallery(&self.pool, id).await? else {
            return Ok(false);
        };
        let deleted = repo::delete_gallery(&self.pool, id).await?;

        if let Some(parent) = gallery.parent_id {
            if repo::get_gallery(&self.pool, &parent).await?.is_some() {
                self.refresh_image_count(&parent).await?;
            }
        }
        Ok(deleted)
    }

    // ============ 目录同步 ============

    /// 扫描 `MEDIA_ROOT/gallery`，每个子目录对应一个图集，最后刷新全部图片数量
    pub async fn sync_from_folder(&self) -> GalleryResult<SyncReport> {
        let gallery_root = self.media_root.join(GALLERY_DIR);
        if !gallery_root.is_dir() {
            warn!("图集目录不存在: {}", gallery_root.display());
            return Ok(SyncReport::default());
        }

        let media_root = self.media_root.clone();
        let scanned = tokio::task::spawn_blocking(move || scan_folders(&media_root))
            .await
            .map_err(|e| GalleryError::Io(std::io::Error::new(ErrorKind::Other, e.to_string())))?;

        let mut report = SyncReport::default();
        for gallery in &scanned {
            let created = repo::upsert_from_folder(&self.pool, gallery).await?;
            if created {
                report.created += 1;
            } else {
                report.updated += 1;
            }
            debug!(
                "{}图集: {} ({} 张图片)",
                if created { "创建" } else { "更新" },
                gallery.title,
                gallery.image_count
            );
        }

        self.refresh_all_counts().await?;
        info!("图集同步完成: 新建 {}, 更新 {}", report.created, report.updated);
        Ok(report)
    }
}

/// 先序遍历 `gallery/` 下的目录（跳过缩略图目录），父目录总在子目录之前
fn scan_folders(media_root: &Path) -> Vec<Gallery> {
    let gallery_root = media_root.join(GALLERY_DIR);
    let thumbnails = gallery_root.join("thumbnails");
    let mut result = Vec::new();

    let walker = WalkDir::new(&gallery_root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.path() != thumbnails.as_path() && e.file_type().is_dir());

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("扫描图集目录失败: {}", e);
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(media_root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let name = entry.file_name().to_string_lossy().into_owned();

        let parent_id = Path::new(&relative)
            .parent()
            .map(|p| p.to_string_lossy().replace('\\', "/"))
            .filter(|p| p != GALLERY_DIR)
            .map(|p| Gallery::id_from_relative_path(&p));

        let folder_path = Gallery::folder_path_from_relative(&relative);
        let mut gallery = Gallery::new(Gallery::id_from_relative_path(&relative), name.clone(), folder_path);
        gallery.description = format!("{}图集", name);
        gallery.parent_id = parent_id;
        gallery.level = entry.depth() as i64 - 1;
        if entry.path().join(COVER_FILENAME).is_file() {
            gallery.cover_url = format!("{}{}", gallery.folder_path, COVER_FILENAME);
        }
        gallery.image_count = std::fs::read_dir(entry.path())
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                    .filter(|e| is_media_file(&e.file_name().to_string_lossy()))
                    .count() as i64
            })
            .unwrap_or(0);

        result.push(gallery);
    }
    result
}

fn is_media_file(name: &str) -> bool {
    if name == COVER_FILENAME {
        return false;
    }
    Path::new(name)
        .extension()
        .map(|e| MEDIA_EXTENSIONS.contains(&e.to_string_lossy().to_lowercase().as_str()))
        .unwrap_or(false)
}

/// 目录内的图片/视频文件名（已排序）
async fn media_files(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_media_file(&name) {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

/// 目录中纯数字文件名（任意扩展名）的最大编号，超出 u32 的编号忽略
async fn max_numeric_stem(dir: &Path) -> std::io::Result<u32> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut max = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let stem = Path::new(&name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !stem.is_empty() && stem.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = stem.parse::<u32>() {
                max = max.max(n);
            }
        }
    }
    Ok(max)
}

/// 独占创建；文件已存在时返回 `None`
async fn create_exclusive(path: &Path) -> std::io::Result<Option<fs::File>> {
    match fs::OpenOptions::new().write(true).create_new(true).open(path).await {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e),
    }
}

/// 上传文件名的小写扩展名（含点），没有扩展名时为空
fn upload_extension(upload_name: &str) -> String {
    Path::new(upload_name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn validate_filename(name: &str) -> GalleryResult<()> {
    let invalid = name.is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name == "."
        || name == ".."
        || name.contains('\0');
    if invalid {
        return Err(GalleryError::InvalidFilename(name.to_string()));
    }
    Ok(())
}
