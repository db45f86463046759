pub mod api_cache;
pub mod bilibili_importer;
pub mod cover_downloader;
pub mod follower_service;
pub mod gallery_service;
pub mod livestream_service;
pub mod song_service;
pub mod thumbnail;

pub use api_cache::{ApiCache, CacheKind};
pub use bilibili_importer::{BilibiliImporter, ImportOutcome, PendingPart, SelectedSong};
pub use cover_downloader::{CoverDownloader, CoverStore};
pub use follower_service::FollowerService;
pub use gallery_service::{GalleryError, GalleryService};
pub use livestream_service::{LivestreamError, LivestreamService};
pub use song_service::{SongError, SongService};
pub use thumbnail::ThumbnailGenerator;
