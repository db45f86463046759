pub mod collection;
pub mod follower;
pub mod gallery;
pub mod livestream;
pub mod settings;
pub mod song;
pub mod validation;

pub use collection::{Collection, CollectionRef, CreateCollectionRequest, CreateWorkRequest, Work, WorkListQuery, WorkView};
pub use follower::{Account, AccountFollowers, FollowerMetric, FollowerPoint, IngestResult, SpiderFollowerFile};
pub use gallery::{
    Breadcrumb, ChildImages, ChildrenImagesView, CreateGalleryRequest, Gallery, GalleryDetail, GalleryImage, GallerySummary,
    GalleryTree, GalleryTreeNode, UpdateGalleryRequest,
};
pub use livestream::{format_duration, Livestream, LivestreamPayload, LivestreamView, Recording, Screenshot, SongCut};
pub use settings::{
    CreateMilestoneRequest, CreateRecommendationRequest, Milestone, Recommendation, RecommendationView,
    SiteSettings, SiteSettingsView, UpdateSiteSettingsRequest,
};
pub use song::{
    BatchTagRequest, CreateRecordRequest, CreateSongRequest, MergeResult, MergeSongsRequest, OriginalWork,
    OriginalWorkView, RankingRange, Song, SongListQuery, SongRecord, SongView, Style, Tag, TopSong,
};
pub use validation::{DateValidator, StringValidator, ValidationError, Validator};
