use moka::future::Cache;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 缓存的接口类别，决定过期时间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    SongDetail,
    SongRecords,
    TopSongs,
    Styles,
    Tags,
    Languages,
}

impl CacheKind {
    pub fn ttl(self) -> Duration {
        match self {
            CacheKind::SongDetail | CacheKind::SongRecords => Duration::from_secs(600),
            CacheKind::TopSongs => Duration::from_secs(300),
            CacheKind::Styles | CacheKind::Tags | CacheKind::Languages => Duration::from_secs(3600),
        }
    }

    fn prefix(self) -> &'static str {
        match self {
            CacheKind::SongDetail => "song_detail",
            CacheKind::SongRecords => "song_records",
            CacheKind::TopSongs => "top_songs",
            CacheKind::Styles => "styles",
            CacheKind::Tags => "tags",
            CacheKind::Languages => "languages",
        }
    }

    pub fn key(self, suffix: &str) -> String {
        if suffix.is_empty() {
            self.prefix().to_string()
        } else {
            format!("{}:{}", self.prefix(), suffix)
        }
    }
}

#[derive(Clone)]
struct Entry {
    ttl: Duration,
    value: Arc<Value>,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// 接口响应缓存（按条目过期）
#[derive(Clone)]
pub struct ApiCache {
    cache: Cache<String, Entry>,
}

impl ApiCache {
    pub fn new(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.cache.get(key).await?;
        match serde_json::from_value(entry.value.as_ref().clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("缓存反序列化失败: {} - {}", key, e);
                self.cache.invalidate(key).await;
                None
            }
        }
    }

    pub async fn insert<T: Serialize>(&self, key: String, value: &T, ttl: Duration) {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.cache
                    .insert(key, Entry { ttl, value: Arc::new(value) })
                    .await
            }
            Err(e) => warn!("缓存序列化失败: {} - {}", key, e),
        }
    }

    /// 命中则返回缓存，否则执行 `load` 并写入
    pub async fn get_or_load<T, E, F, Fut>(&self, kind: CacheKind, suffix: &str, load: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = kind.key(suffix);
        if let Some(hit) = self.get(&key).await {
            debug!("缓存命中: {}", key);
            return Ok(hit);
        }

        let value = load().await?;
        self.insert(key, &value, kind.ttl()).await;
        Ok(value)
    }

    pub async fn invalidate(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// 清空全部缓存
    pub async fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_ttls() {
        assert_eq!(CacheKind::SongDetail.ttl(), Duration::from_secs(600));
        assert_eq!(CacheKind::TopSongs.ttl(), Duration::from_secs(300));
        assert_eq!(CacheKind::Styles.ttl(), Duration::from_secs(3600));
        assert_eq!(CacheKind::TopSongs.key("all:10"), "top_songs:all:10");
        assert_eq!(CacheKind::Tags.key(""), "tags");
    }

    #[tokio::test]
    async fn test_get_or_load_caches() {
        let cache = ApiCache::new(100);
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value: Result<Vec<String>, ()> = cache
                .get_or_load(CacheKind::Styles, "", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(vec!["流行".to_string()])
                })
                .await;
            assert_eq!(value.unwrap(), vec!["流行".to_string()]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = ApiCache::new(100);
        let first: Result<i64, &str> = cache.get_or_load(CacheKind::TopSongs, "x", || async { Err("boom") }).await;
        assert!(first.is_err());
        let second: Result<i64, &str> = cache.get_or_load(CacheKind::TopSongs, "x", || async { Ok(7) }).await;
        assert_eq!(second.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = ApiCache::new(100);
        cache.insert("k".into(), &1, Duration::from_secs(60)).await;
        assert_eq!(cache.get::<i32>("k").await, Some(1));
        cache.clear().await;
        assert_eq!(cache.get::<i32>("k").await, None);
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let cache = ApiCache::new(100);
        cache.insert("short".into(), &1, Duration::from_millis(50)).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get::<i32>("short").await, None);
    }
}
