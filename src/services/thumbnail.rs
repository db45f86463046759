// 缩略图生成器
//
// 原图位于 `MEDIA_ROOT/{module}/...`，缩略图镜像存放在 `MEDIA_ROOT/{module}/thumbnails/...`。
// 静态图统一输出 WebP，GIF 输出首帧 GIF。

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::task;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 缩略图质量
const QUALITY: f32 = 85.0;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("未知模块: {0}")]
    UnknownModule(String),

    #[error("非法路径: {0}")]
    InvalidPath(String),

    #[error("图片处理失败: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("任务执行失败: {0}")]
    Task(String),
}

/// 模块缩略图配置
#[derive(Debug, Clone, Copy)]
pub struct ModuleConfig {
    pub name: &'static str,
    /// `None` 表示该模块不生成缩略图
    pub size: Option<(u32, u32)>,
    pub keep_aspect_ratio: bool,
}

impl ModuleConfig {
    pub fn thumbnail_dir(&self) -> String {
        format!("{}/thumbnails", self.name)
    }
}

pub const MODULES: &[ModuleConfig] = &[
    ModuleConfig { name: "gallery", size: Some((400, 400)), keep_aspect_ratio: true },
    ModuleConfig { name: "covers", size: Some((300, 300)), keep_aspect_ratio: true },
    ModuleConfig { name: "footprint", size: Some((300, 300)), keep_aspect_ratio: true },
    ModuleConfig { name: "songlist", size: None, keep_aspect_ratio: true },
    ModuleConfig { name: "settings", size: None, keep_aspect_ratio: true },
];

/// 单次生成的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Generated(String),
    /// 缩略图比原图新，直接复用
    UpToDate(String),
    /// 模块不生成缩略图或无法识别模块
    Unsupported,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupStats {
    pub total: usize,
    pub deleted: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ThumbnailGenerator {
    media_root: PathBuf,
}

impl ThumbnailGenerator {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self { media_root: media_root.into() }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// 根据路径前缀识别模块
    pub fn module_for(path: &str) -> Option<&'static ModuleConfig> {
        let path = path.trim_start_matches('/');
        MODULES
            .iter()
            .find(|m| path.strip_prefix(m.name).map_or(false, |rest| rest.starts_with('/')))
    }

    pub fn find_module(name: &str) -> Option<&'static ModuleConfig> {
        MODULES.iter().find(|m| m.name == name)
    }

    /// 缩略图相对路径；模块不支持时返回原路径
    pub fn thumbnail_path(original: &str) -> String {
        let original = original.trim_start_matches('/');
        let Some(module) = Self::module_for(original) else {
            return original.to_string();
        };
        if module.size.is_none() {
            return original.to_string();
        }

        let relative = &original[module.name.len() + 1..];
        let ext = extension_of(original);
        let output_ext = if ext == "gif" { "gif" } else { "webp" };

        let thumb = Path::new(&module.thumbnail_dir()).join(relative).with_extension(output_ext);
        to_slash(&thumb)
    }

    /// 生成缩略图，失败时返回原路径
    pub async fn generate(&self, original: &str, force: bool) -> String {
        let original = original.trim_start_matches('/').to_string();
        let this = self.clone();
        let path = original.clone();

        match task::spawn_blocking(move || this.generate_blocking(&path, force)).await {
            Ok(Ok(Outcome::Generated(thumb))) | Ok(Ok(Outcome::UpToDate(thumb))) => thumb,
            Ok(Ok(Outcome::Unsupported)) => original,
            Ok(Err(e)) => {
                warn!("生成缩略图失败: {}, 错误: {}", original, e);
                original
            }
            Err(e) => {
                warn!("缩略图任务失败: {}, 错误: {}", original, e);
                original
            }
        }
    }

    /// 缩略图 URL（`/media/...`）；无法生成时原样返回
    pub async fn thumbnail_url(&self, original_url: &str) -> String {
        if original_url.is_empty() {
            return String::new();
        }
        let original = original_url.trim_start_matches('/');
        let original = original.strip_prefix("media/").unwrap_or(original);

        let thumb = self.generate(original, false).await;
        if thumb == original {
            original_url.to_string()
        } else {
            format!("/media/{}", thumb)
        }
    }

    /// 同步生成，供批处理与阻塞线程池使用
    pub fn generate_blocking(&self, original: &str, force: bool) -> Result<Outcome, ThumbnailError> {
        let original = original.trim_start_matches('/');
        if !is_safe_relative(original) {
            return Err(ThumbnailError::InvalidPath(original.to_string()));
        }

        let Some(module) = Self::module_for(original) else {
            return Ok(Outcome::Unsupported);
        };
        let Some((width, height)) = module.size else {
            return Ok(Outcome::Unsupported);
        };

        let thumb_rel = Self::thumbnail_path(original);
        let source = self.media_root.join(original);
        let target = self.media_root.join(&thumb_rel);

        if !force && target.exists() {
            let original_mtime = std::fs::metadata(&source).and_then(|m| m.modified());
            let thumb_mtime = std::fs::metadata(&target).and_then(|m| m.modified());
            if let (Ok(o), Ok(t)) = (original_mtime, thumb_mtime) {
                if o <= t {
                    return Ok(Outcome::UpToDate(thumb_rel));
                }
            }
        }

        let img = image::open(&source)?;
        let img = resize(img, width, height, module.keep_aspect_ratio);

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }

        if extension_of(&thumb_rel) == "gif" {
            img.save_with_format(&target, ImageFormat::Gif)?;
        } else {
            let rgba = img.to_rgba8();
            let (w, h) = rgba.dimensions();
            let encoded = webp::Encoder::from_rgba(&rgba, w, h).encode(QUALITY);
            std::fs::write(&target, &*encoded)?;
        }

        debug!("缩略图已生成: {} -> {}", original, thumb_rel);
        Ok(Outcome::Generated(thumb_rel))
    }

    /// 删除原图对应的缩略图，返回是否删除了文件
    pub fn delete_thumbnail(&self, original: &str) -> bool {
        let original = original.trim_start_matches('/');
        let thumb = Self::thumbnail_path(original);
        if thumb == original {
            return false;
        }
        match std::fs::remove_file(self.media_root.join(&thumb)) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!("删除缩略图失败: {}, 错误: {}", thumb, e);
                false
            }
        }
    }

    /// 批量生成；`module` 为空时处理所有模块
    pub async fn batch_generate(&self, module: Option<&str>, force: bool) -> Result<BatchStats, ThumbnailError> {
        let modules: Vec<&'static ModuleConfig> = match module {
            Some(name) => vec![Self::find_module(name).ok_or_else(|| ThumbnailError::UnknownModule(name.to_string()))?],
            None => MODULES.iter().collect(),
        };

        let this = self.clone();
        task::spawn_blocking(move || this.batch_generate_blocking(&modules, force))
            .await
            .map_err(|e| ThumbnailError::Task(e.to_string()))
    }

    fn batch_generate_blocking(&self, modules: &[&'static ModuleConfig], force: bool) -> BatchStats {
        let mut stats = BatchStats::default();

        for module in modules.iter().filter(|m| m.size.is_some()) {
            let module_dir = self.media_root.join(module.name);
            if !module_dir.is_dir() {
                continue;
            }
            let thumb_dir = self.media_root.join(module.thumbnail_dir());

            let walker = WalkDir::new(&module_dir)
                .into_iter()
                .filter_entry(|e| e.path() != thumb_dir.as_path());

            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        stats.errors.push(format!("模块 {}: {}", module.name, e));
                        continue;
                    }
                };
                if !entry.file_type().is_file() || !is_image(entry.path()) {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&self.media_root) else {
                    continue;
                };
                let relative = to_slash(relative);
                stats.total += 1;

                match self.generate_blocking(&relative, force) {
                    Ok(Outcome::Generated(_)) => stats.success += 1,
                    Ok(Outcome::UpToDate(_)) | Ok(Outcome::Unsupported) => stats.skipped += 1,
                    Err(e) => {
                        stats.failed += 1;
                        stats.errors.push(format!("{}: {}", relative, e));
                    }
                }
            }
        }

        info!(
            "批量生成缩略图完成: 总计 {}, 成功 {}, 跳过 {}, 失败 {}",
            stats.total, stats.success, stats.skipped, stats.failed
        );
        stats
    }

    /// 删除原图已不存在的缩略图
    ///
    /// 原图按文件名（不含扩展名）在镜像目录的真实文件中查找，任何扩展名均可匹配。
    pub async fn cleanup_orphans(&self) -> Result<CleanupStats, ThumbnailError> {
        let this = self.clone();
        task::spawn_blocking(move || this.cleanup_orphans_blocking())
            .await
            .map_err(|e| ThumbnailError::Task(e.to_string()))
    }

    fn cleanup_orphans_blocking(&self) -> CleanupStats {
        let mut stats = CleanupStats::default();
        let mut stem_index: HashMap<PathBuf, HashSet<String>> = HashMap::new();

        for module in MODULES.iter().filter(|m| m.size.is_some()) {
            let thumb_root = self.media_root.join(module.thumbnail_dir());
            if !thumb_root.is_dir() {
                continue;
            }
            let module_root = self.media_root.join(module.name);

            for entry in WalkDir::new(&thumb_root) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        stats.errors.push(format!("模块 {}: {}", module.name, e));
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                stats.total += 1;

                let Ok(relative) = entry.path().strip_prefix(&thumb_root) else {
                    continue;
                };
                let original_dir = module_root.join(relative.parent().unwrap_or_else(|| Path::new("")));
                let stem = file_stem(entry.path());

                let stems = stem_index
                    .entry(original_dir.clone())
                    .or_insert_with(|| stems_in(&original_dir));

                if stems.contains(&stem) {
                    continue;
                }

                match std::fs::remove_file(entry.path()) {
                    Ok(()) => {
                        debug!("删除孤立缩略图: {}", entry.path().display());
                        stats.deleted += 1;
                    }
                    Err(e) => stats.errors.push(format!("{}: {}", entry.path().display(), e)),
                }
            }
        }

        info!("清理孤立缩略图完成: 扫描 {}, 删除 {}", stats.total, stats.deleted);
        stats
    }
}

fn resize(img: DynamicImage, width: u32, height: u32, keep_aspect_ratio: bool) -> DynamicImage {
    let (w, h) = img.dimensions();
    if keep_aspect_ratio {
        if w <= width && h <= height {
            img
        } else {
            img.resize(width, height, FilterType::Lanczos3)
        }
    } else {
        img.resize_to_fill(width, height, FilterType::Lanczos3)
    }
}

/// 目录中真实文件的 stem 集合；目录不存在时为空
fn stems_in(dir: &Path) -> HashSet<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .map(|e| file_stem(&e.path()))
                .collect()
        })
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_string_lossy().to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_safe_relative(path: &str) -> bool {
    Path::new(path)
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_jpeg(root: &Path, rel: &str, w: u32, h: u32) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(w, h, Rgb([200, 10, 10])).save(&path).unwrap();
    }

    #[test]
    fn test_thumbnail_path_mirrors_structure() {
        assert_eq!(
            ThumbnailGenerator::thumbnail_path("/gallery/A/B/001.JPG"),
            "gallery/thumbnails/A/B/001.webp"
        );
        assert_eq!(
            ThumbnailGenerator::thumbnail_path("covers/2025/01/x.gif"),
            "covers/thumbnails/2025/01/x.gif"
        );
        assert_eq!(ThumbnailGenerator::thumbnail_path("songlist/a.jpg"), "songlist/a.jpg");
        assert_eq!(ThumbnailGenerator::thumbnail_path("unknown/a.jpg"), "unknown/a.jpg");
    }

    #[test]
    fn test_module_prefix_must_be_a_directory() {
        assert!(ThumbnailGenerator::module_for("gallery/a.jpg").is_some());
        assert!(ThumbnailGenerator::module_for("gallery_old/a.jpg").is_none());
    }

    #[tokio::test]
    async fn test_generate_then_reuse() {
        let dir = TempDir::new().unwrap();
        write_jpeg(dir.path(), "gallery/A/001.jpg", 800, 600);
        let generator = ThumbnailGenerator::new(dir.path());

        let first = generator.generate_blocking("gallery/A/001.jpg", false).unwrap();
        assert_eq!(first, Outcome::Generated("gallery/thumbnails/A/001.webp".into()));

        let thumb = image::open(dir.path().join("gallery/thumbnails/A/001.webp")).unwrap();
        assert_eq!(thumb.dimensions(), (400, 300));

        let second = generator.generate_blocking("gallery/A/001.jpg", false).unwrap();
        assert!(matches!(second, Outcome::UpToDate(_)));

        let forced = generator.generate_blocking("gallery/A/001.jpg", true).unwrap();
        assert!(matches!(forced, Outcome::Generated(_)));
    }

    #[tokio::test]
    async fn test_missing_original_falls_back() {
        let dir = TempDir::new().unwrap();
        let generator = ThumbnailGenerator::new(dir.path());
        assert_eq!(generator.generate("gallery/none.jpg", false).await, "gallery/none.jpg");
        assert_eq!(generator.thumbnail_url("/gallery/none.jpg").await, "/gallery/none.jpg");
    }

    #[test]
    fn test_rejects_parent_components() {
        let dir = TempDir::new().unwrap();
        let generator = ThumbnailGenerator::new(dir.path());
        assert!(matches!(
            generator.generate_blocking("gallery/../../etc/passwd", false),
            Err(ThumbnailError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_batch_skips_thumbnail_dir() {
        let dir = TempDir::new().unwrap();
        write_jpeg(dir.path(), "gallery/A/001.jpg", 50, 50);
        write_jpeg(dir.path(), "gallery/A/002.jpg", 50, 50);
        let generator = ThumbnailGenerator::new(dir.path());

        let stats = generator.batch_generate(Some("gallery"), false).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.success, 2);

        let again = generator.batch_generate(None, false).await.unwrap();
        assert_eq!(again.total, 2);
        assert_eq!(again.skipped, 2);
    }

    #[tokio::test]
    async fn test_unknown_module() {
        let dir = TempDir::new().unwrap();
        let generator = ThumbnailGenerator::new(dir.path());
        assert!(matches!(
            generator.batch_generate(Some("nope"), false).await,
            Err(ThumbnailError::UnknownModule(_))
        ));
    }

    #[tokio::test]
    async fn test_cleanup_matches_any_original_extension() {
        let dir = TempDir::new().unwrap();
        // 原图是 .bmp 之类不在常见列表中的扩展名，也应被识别
        std::fs::create_dir_all(dir.path().join("gallery/A")).unwrap();
        std::fs::write(dir.path().join("gallery/A/keep.bmp"), b"x").unwrap();
        std::fs::create_dir_all(dir.path().join("gallery/thumbnails/A")).unwrap();
        std::fs::write(dir.path().join("gallery/thumbnails/A/keep.webp"), b"x").unwrap();
        std::fs::write(dir.path().join("gallery/thumbnails/A/gone.webp"), b"x").unwrap();

        let generator = ThumbnailGenerator::new(dir.path());
        let stats = generator.cleanup_orphans().await.unwrap();

        assert_eq!(stats.total, 2);
        assert_eq!(stats.deleted, 1);
        assert!(dir.path().join("gallery/thumbnails/A/keep.webp").exists());
        assert!(!dir.path().join("gallery/thumbnails/A/gone.webp").exists());
    }

    #[test]
    fn test_delete_thumbnail() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("gallery/thumbnails/A")).unwrap();
        std::fs::write(dir.path().join("gallery/thumbnails/A/001.webp"), b"x").unwrap();
        let generator = ThumbnailGenerator::new(dir.path());

        assert!(generator.delete_thumbnail("/gallery/A/001.png"));
        assert!(!generator.delete_thumbnail("/gallery/A/001.png"));
    }
}
