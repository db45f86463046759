// B站分P导入
//
// 解析视频分P标题中的日期与歌名，按日期下载封面，为每个分P创建演唱记录。
// 遇到同名歌曲有多首时中断并返回冲突，由人工选择后带着剩余分P继续。

use anyhow::Result;
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::database::song_repository;
use crate::external::bilibili::{BilibiliError, VideoMetadataSource};
use crate::models::Song;
use crate::services::cover_downloader::CoverStore;

lazy_static! {
    static ref TITLE_DATE: Regex =
        Regex::new(r"(\d{4})年(\d{1,2})月(\d{1,2})日").expect("Invalid title date regex");
}

pub const NOTE_SAME_PART: &str = "✅ 已导入（同P）";
pub const NOTE_NEW_SONG_DATE_TAKEN: &str = "❌ 新歌曲但该日期已有记录";
pub const NOTE_EXISTS: &str = "❌ 已存在，跳过";
pub const NOTE_SELECTED_MISSING: &str = "❌ 选定的歌曲不存在";
pub const NEW_SONG_SENTINEL: &str = "__new__";

/// 待处理的分P
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPart {
    pub page: u32,
    #[serde(default)]
    pub cid: i64,
    pub title: String,
    pub song_name: String,
    /// `YYYY-MM-DD`
    pub performed_date: NaiveDate,
    pub part_url: String,
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedPart {
    pub song_name: String,
    pub url: String,
    pub note: Option<String>,
    pub created_song: bool,
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SongCandidate {
    pub id: i64,
    pub song_name: String,
    pub singer: Option<String>,
    pub perform_count: i64,
    pub last_performed: Option<NaiveDate>,
}

impl From<Song> for SongCandidate {
    fn from(s: Song) -> Self {
        Self {
            id: s.id,
            song_name: s.song_name,
            singer: s.singer,
            perform_count: s.perform_count,
            last_performed: s.last_performed,
        }
    }
}

/// 同名歌曲冲突
#[derive(Debug, Clone, Serialize)]
pub struct ConflictInfo {
    pub song_name: String,
    pub candidates: Vec<SongCandidate>,
    pub current_part: PendingPart,
    /// 当前冲突分P在前，其后为尚未处理的分P
    pub remaining_parts: Vec<PendingPart>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportOutcome {
    pub results: Vec<ImportedPart>,
    pub remaining_parts: Vec<PendingPart>,
    pub conflict: Option<ConflictInfo>,
    pub error: Option<String>,
}

/// 冲突时的人工选择
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedSong {
    New,
    Existing(i64),
}

impl SelectedSong {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw == NEW_SONG_SENTINEL {
            return Some(SelectedSong::New);
        }
        raw.parse().ok().map(SelectedSong::Existing)
    }
}

/// 从分P标题解析歌名与日期；标题中没有合法日期时返回 `None`
pub fn parse_part_title(title: &str) -> Option<(String, NaiveDate)> {
    let caps = TITLE_DATE.captures(title)?;
    let year: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;

    let stripped = TITLE_DATE.replace_all(title, "");
    let trimmed = stripped.trim_matches(|c| c == '-' || c == ' ').trim();
    let song_name = trimmed.split('-').next().unwrap_or("").trim().to_string();

    Some((song_name, date))
}

pub struct BilibiliImporter {
    pool: Pool<Sqlite>,
    source: Arc<dyn VideoMetadataSource>,
    covers: Arc<dyn CoverStore>,
}

impl BilibiliImporter {
    pub fn new(pool: Pool<Sqlite>, source: Arc<dyn VideoMetadataSource>, covers: Arc<dyn CoverStore>) -> Self {
        Self { pool, source, covers }
    }

    /// 导入一个BV号
    ///
    /// `pending_parts` 为空时解析整个视频；否则继续处理上次冲突剩下的分P，
    /// 第一个分P使用 `selected` 指定的歌曲。
    pub async fn import_bv(
        &self,
        bvid: &str,
        selected: Option<SelectedSong>,
        pending_parts: Option<Vec<PendingPart>>,
    ) -> Result<ImportOutcome> {
        info!("[BV:{}] 开始导入", bvid);

        let pending = match pending_parts {
            Some(parts) => parts,
            None => match self.parse_bv_parts(bvid).await {
                Ok(parts) => parts,
                Err(e) => {
                    warn!("[BV:{}] 解析失败: {}", bvid, e);
                    return Ok(ImportOutcome {
                        error: Some(format!("B站API错误: {}", e)),
                        ..ImportOutcome::default()
                    });
                }
            },
        };

        let mut outcome = ImportOutcome::default();
        if pending.is_empty() {
            info!("[BV:{}] 没有找到有效的分P信息", bvid);
            return Ok(outcome);
        }

        let mut batch_counts: HashMap<String, usize> = HashMap::new();
        let rest = match selected {
            Some(selection) => {
                let mut parts = pending.into_iter();
                if let Some(first) = parts.next() {
                    outcome
                        .results
                        .push(self.process_selected(bvid, &first, selection, &mut batch_counts).await?);
                }
                parts.collect()
            }
            None => pending,
        };

        self.process_parts(bvid, rest, &mut batch_counts, &mut outcome).await?;
        info!("[BV:{}] 导入完成，共处理 {} 条", bvid, outcome.results.len());
        Ok(outcome)
    }

    /// 拉取分P列表与视频封面，过滤出标题带日期的分P，封面按日期只下载一次
    pub async fn parse_bv_parts(&self, bvid: &str) -> Result<Vec<PendingPart>, BilibiliError> {
        let pages = self.source.page_list(bvid).await?;
        debug!("[BV:{}] 获取分P信息成功，共 {} 个分P", bvid, pages.len());

        let remote_cover = match self.source.video_info(bvid).await {
            Ok(info) if !info.pic.is_empty() => Some(info.pic),
            Ok(_) => None,
            Err(e) => {
                warn!("[BV:{}] 获取总封面失败: {}", bvid, e);
                None
            }
        };

        let mut local_covers: HashMap<NaiveDate, Option<String>> = HashMap::new();
        let mut parts = Vec::new();
        let mut skipped = 0usize;

        for page in &pages {
            let Some((song_name, date)) = parse_part_title(&page.part) else {
                debug!("[BV:{}] 分P标题不含时间: {}", bvid, page.part);
                skipped += 1;
                continue;
            };

            let cover_url = match local_covers.get(&date) {
                Some(cached) => cached.clone(),
                None => {
                    let resolved = match remote_cover.as_deref() {
                        Some(remote) => match self.covers.store_by_date(remote, date).await {
                            Some(local) => Some(local),
                            None => Some(remote.to_string()),
                        },
                        None => None,
                    };
                    local_covers.insert(date, resolved.clone());
                    resolved
                }
            };

            parts.push(PendingPart {
                page: page.page,
                cid: page.cid,
                title: page.part.clone(),
                song_name,
                performed_date: date,
                part_url: page.player_url(bvid),
                cover_url,
            });
        }

        info!(
            "[BV:{}] 解析完成，有效分P {} 个 (总计 {}, 跳过 {})",
            bvid,
            parts.len(),
            pages.len(),
            skipped
        );
        Ok(parts)
    }

    async fn process_selected(
        &self,
        bvid: &str,
        part: &PendingPart,
        selection: SelectedSong,
        batch_counts: &mut HashMap<String, usize>,
    ) -> Result<ImportedPart> {
        let (song, created_song) = match selection {
            SelectedSong::New => {
                let song = song_repository::create_song(&self.pool, &part.song_name, None, None).await?;
                info!("[BV:{}] 创建新歌曲: {} (ID: {})", bvid, part.song_name, song.id);
                (song, true)
            }
            SelectedSong::Existing(id) => match song_repository::get_song(&self.pool, id).await? {
                Some(song) => (song, false),
                None => {
                    return Ok(ImportedPart {
                        song_name: part.song_name.clone(),
                        url: part.part_url.clone(),
                        note: Some(NOTE_SELECTED_MISSING.to_string()),
                        created_song: false,
                        cover_url: part.cover_url.clone(),
                    })
                }
            },
        };

        self.record_part(part, &song, created_song, batch_counts).await
    }

    async fn process_parts(
        &self,
        bvid: &str,
        parts: Vec<PendingPart>,
        batch_counts: &mut HashMap<String, usize>,
        outcome: &mut ImportOutcome,
    ) -> Result<()> {
        for (idx, part) in parts.iter().enumerate() {
            let mut matches = song_repository::find_songs_by_name(&self.pool, &part.song_name).await?;

            let (song, created_song) = match matches.len() {
                0 => (
                    song_repository::create_song(&self.pool, &part.song_name, None, None).await?,
                    true,
                ),
                1 => (matches.remove(0), false),
                _ => {
                    info!("[BV:{}] 歌曲重名，等待人工选择: {}", bvid, part.song_name);
                    let remaining = parts[idx..].to_vec();
                    outcome.remaining_parts = remaining.clone();
                    outcome.conflict = Some(ConflictInfo {
                        song_name: part.song_name.clone(),
                        candidates: matches.into_iter().map(SongCandidate::from).collect(),
                        current_part: part.clone(),
                        remaining_parts: remaining,
                    });
                    return Ok(());
                }
            };

            let imported = self.record_part(part, &song, created_song, batch_counts).await?;
            outcome.results.push(imported);
        }
        Ok(())
    }

    /// 已有同日记录则跳过并给出说明，否则创建记录；同批重复的歌曲标注版本号
    async fn record_part(
        &self,
        part: &PendingPart,
        song: &Song,
        created_song: bool,
        batch_counts: &mut HashMap<String, usize>,
    ) -> Result<ImportedPart> {
        if let Some(existing) = song_repository::find_record(&self.pool, song.id, part.performed_date).await? {
            let note = if existing.url.as_deref() == Some(part.part_url.as_str()) {
                NOTE_SAME_PART
            } else if created_song {
                NOTE_NEW_SONG_DATE_TAKEN
            } else {
                NOTE_EXISTS
            };
            return Ok(ImportedPart {
                song_name: part.song_name.clone(),
                url: part.part_url.clone(),
                note: Some(note.to_string()),
                created_song: false,
                cover_url: part.cover_url.clone(),
            });
        }

        let count = batch_counts.entry(part.song_name.clone()).or_insert(0);
        *count += 1;
        let note = (*count > 1).then(|| format!("同批版本 {}", count));

        song_repository::create_record(
            &self.pool,
            song.id,
            part.performed_date,
            Some(&part.part_url),
            note.as_deref(),
            part.cover_url.as_deref(),
        )
        .await?;

        Ok(ImportedPart {
            song_name: part.song_name.clone(),
            url: part.part_url.clone(),
            note,
            created_song,
            cover_url: part.cover_url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_title_with_suffix() {
        let (name, date) = parse_part_title("2025年6月12日 晴天-周杰伦").unwrap();
        assert_eq!(name, "晴天");
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 6, 12).unwrap());
    }

    #[test]
    fn test_parse_title_date_last() {
        let (name, _) = parse_part_title("- 夜曲 - 2024年1月3日").unwrap();
        assert_eq!(name, "夜曲");
    }

    #[test]
    fn test_parse_title_invalid_date() {
        assert!(parse_part_title("2025年2月30日 不存在").is_none());
        assert!(parse_part_title("没有日期的标题").is_none());
    }

    #[test]
    fn test_selected_song_parse() {
        assert_eq!(SelectedSong::parse("__new__"), Some(SelectedSong::New));
        assert_eq!(SelectedSong::parse(" 42 "), Some(SelectedSong::Existing(42)));
        assert_eq!(SelectedSong::parse("abc"), None);
    }
}
