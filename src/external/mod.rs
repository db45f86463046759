pub mod bilibili;

pub use bilibili::{
    BilibiliClient, BilibiliError, PageInfo, RelationStat, VideoInfo, VideoMetadataSource,
};
