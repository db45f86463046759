// BV导入集成测试
//
// 用内存中的视频来源与封面存储替代 B站，验证冲突中断、人工选择后续导、封面按日期复用。

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use fans_home_backend::database::{song_repository, Database};
use fans_home_backend::external::bilibili::{BilibiliError, PageInfo, VideoInfo, VideoMetadataSource};
use fans_home_backend::services::bilibili_importer::{NOTE_EXISTS, NOTE_SAME_PART};
use fans_home_backend::services::{BilibiliImporter, CoverStore, SelectedSong};

const BVID: &str = "BV1xx411c7mD";

struct FakeSource {
    titles: Vec<&'static str>,
    fail: bool,
}

#[async_trait]
impl VideoMetadataSource for FakeSource {
    async fn video_info(&self, bvid: &str) -> Result<VideoInfo, BilibiliError> {
        Ok(serde_json::from_value(serde_json::json!({
            "bvid": bvid,
            "title": "直播歌切合集",
            "pic": "https://i0.hdslb.com/bfs/archive/cover.jpg",
        }))
        .unwrap())
    }

    async fn page_list(&self, _bvid: &str) -> Result<Vec<PageInfo>, BilibiliError> {
        if self.fail {
            return Err(BilibiliError::Api {
                code: -404,
                message: "啥都木有".to_string(),
            });
        }
        Ok(self
            .titles
            .iter()
            .enumerate()
            .map(|(i, title)| PageInfo {
                page: i as u32 + 1,
                cid: 1000 + i as i64,
                part: title.to_string(),
                duration: 240,
            })
            .collect())
    }
}

#[derive(Default)]
struct RecordingCovers {
    calls: Mutex<Vec<NaiveDate>>,
}

#[async_trait]
impl CoverStore for RecordingCovers {
    async fn store_by_date(&self, _cover_url: &str, date: NaiveDate) -> Option<String> {
        self.calls.lock().unwrap().push(date);
        Some(format!("/covers/{}/{}.jpg", date.format("%Y/%m"), date.format("%Y-%m-%d")))
    }
}

fn titles() -> Vec<&'static str> {
    vec![
        "2025年6月12日 稻香-周杰伦",
        "2025年6月12日 晴天",
        "2025年6月13日 夜曲",
        "开场闲聊",
        "2025年6月14日 夜曲",
    ]
}

async fn setup(fail: bool) -> (Database, Arc<RecordingCovers>, BilibiliImporter) {
    let db = Database::in_memory().await.unwrap();
    let covers = Arc::new(RecordingCovers::default());
    let source = Arc::new(FakeSource { titles: titles(), fail });
    let importer = BilibiliImporter::new(db.pool().clone(), source, covers.clone());
    (db, covers, importer)
}

#[tokio::test]
async fn test_conflict_then_resume_with_selection() {
    let (db, covers, importer) = setup(false).await;
    let pool = db.pool();
    let first_qingtian = song_repository::create_song(pool, "晴天", Some("周杰伦"), None).await.unwrap();
    song_repository::create_song(pool, "晴天", Some("翻唱"), None).await.unwrap();
    let yequ = song_repository::create_song(pool, "夜曲", None, None).await.unwrap();

    let outcome = importer.import_bv(BVID, None, None).await.unwrap();
    assert!(outcome.error.is_none());
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(outcome.results[0].song_name, "稻香");
    assert!(outcome.results[0].created_song);
    assert_eq!(
        outcome.results[0].cover_url.as_deref(),
        Some("/covers/2025/06/2025-06-12.jpg")
    );

    let conflict = outcome.conflict.expect("重名歌曲应触发冲突");
    assert_eq!(conflict.song_name, "晴天");
    assert_eq!(conflict.candidates.len(), 2);
    assert_eq!(conflict.current_part.page, 2);
    let pages: Vec<u32> = outcome.remaining_parts.iter().map(|p| p.page).collect();
    assert_eq!(pages, vec![2, 3, 5]);

    // 每个日期只下载一次封面
    assert_eq!(covers.calls.lock().unwrap().len(), 3);

    let resumed = importer
        .import_bv(BVID, Some(SelectedSong::Existing(first_qingtian.id)), Some(outcome.remaining_parts))
        .await
        .unwrap();
    assert!(resumed.conflict.is_none());
    assert_eq!(resumed.results.len(), 3);
    assert_eq!(resumed.results[0].song_name, "晴天");
    assert!(!resumed.results[0].created_song);
    assert_eq!(resumed.results[1].note, None);
    assert_eq!(resumed.results[2].note.as_deref(), Some("同批版本 2"));

    let records = song_repository::list_records(pool, yequ.id, 10, 0).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].performed_at, NaiveDate::from_ymd_opt(2025, 6, 14).unwrap());
    assert_eq!(
        records[0].url.as_deref(),
        Some("https://player.bilibili.com/player.html?bvid=BV1xx411c7mD&p=5")
    );
    assert_eq!(song_repository::count_records(pool, first_qingtian.id).await.unwrap(), 1);
}

#[tokio::test]
async fn test_reimport_marks_existing_parts() {
    let (db, _covers, importer) = setup(false).await;
    let yequ = song_repository::create_song(db.pool(), "夜曲", None, None).await.unwrap();

    let first = importer.import_bv(BVID, None, None).await.unwrap();
    assert_eq!(first.results.len(), 4);

    let second = importer.import_bv(BVID, None, None).await.unwrap();
    assert_eq!(second.results.len(), 4);
    assert!(second
        .results
        .iter()
        .all(|r| r.note.as_deref() == Some(NOTE_SAME_PART) && !r.created_song));

    // 同日已有其他来源的记录
    let date = NaiveDate::from_ymd_opt(2025, 7, 1).unwrap();
    song_repository::create_record(db.pool(), yequ.id, date, Some("https://example.com/other"), None, None)
        .await
        .unwrap();
    let part = fans_home_backend::services::PendingPart {
        page: 9,
        cid: 0,
        title: "2025年7月1日 夜曲".to_string(),
        song_name: "夜曲".to_string(),
        performed_date: date,
        part_url: "https://player.bilibili.com/player.html?bvid=BV1xx411c7mD&p=9".to_string(),
        cover_url: None,
    };
    let third = importer
        .import_bv(BVID, Some(SelectedSong::Existing(yequ.id)), Some(vec![part]))
        .await
        .unwrap();
    assert_eq!(third.results[0].note.as_deref(), Some(NOTE_EXISTS));
}

#[tokio::test]
async fn test_page_list_failure_is_reported_in_outcome() {
    let (_db, covers, importer) = setup(true).await;
    let outcome = importer.import_bv(BVID, None, None).await.unwrap();

    assert!(outcome.results.is_empty());
    assert!(outcome.conflict.is_none());
    assert!(outcome.error.unwrap().starts_with("B站API错误"));
    assert!(covers.calls.lock().unwrap().is_empty());
}
