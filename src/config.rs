use std::path::PathBuf;
use std::time::Duration;

/// 应用配置（从环境变量读取，支持 .env）
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// 媒体根目录，对应 `/media/` 路由
    pub media_root: PathBuf,
    /// 管理接口令牌，未配置时管理接口全部拒绝
    pub admin_token: Option<String>,
    pub log_level: String,
    pub bilibili: BilibiliConfig,
    pub livestream: LivestreamConfig,
    pub cache_max_entries: u64,
}

#[derive(Debug, Clone)]
pub struct BilibiliConfig {
    pub timeout: Duration,
    pub retry_times: u32,
    pub retry_delay: Duration,
    /// 封面最大字节数
    pub max_cover_size: usize,
}

impl Default for BilibiliConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_times: 3,
            retry_delay: Duration::from_secs(1),
            max_cover_size: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LivestreamConfig {
    pub min_year: i32,
    pub max_year: i32,
}

impl Default for LivestreamConfig {
    fn default() -> Self {
        Self {
            min_year: 2019,
            max_year: 2030,
        }
    }
}

impl AppConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = BilibiliConfig::default();
        let bilibili = BilibiliConfig {
            timeout: Duration::from_secs(env_or("BILIBILI_TIMEOUT_SECS", 10)),
            retry_times: env_or("BILIBILI_RETRY_TIMES", defaults.retry_times),
            retry_delay: Duration::from_millis(env_or("BILIBILI_RETRY_DELAY_MS", 1000)),
            max_cover_size: defaults.max_cover_size,
        };

        let livestream = LivestreamConfig {
            min_year: env_or("LIVESTREAM_MIN_YEAR", 2019),
            max_year: env_or("LIVESTREAM_MAX_YEAR", 2030),
        };

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:./fans_home.db?mode=rwc".to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8000),
            media_root: PathBuf::from(
                std::env::var("MEDIA_ROOT").unwrap_or_else(|_| "./media".to_string()),
            ),
            admin_token: std::env::var("ADMIN_TOKEN").ok().filter(|t| !t.trim().is_empty()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            bilibili,
            livestream,
            cache_max_entries: env_or("CACHE_MAX_ENTRIES", 10_000),
        }
    }

    /// 测试和命令行使用的配置
    pub fn for_media_root(database_url: impl Into<String>, media_root: impl Into<PathBuf>) -> Self {
        Self {
            database_url: database_url.into(),
            host: "127.0.0.1".to_string(),
            port: 0,
            media_root: media_root.into(),
            admin_token: None,
            log_level: "info".to_string(),
            bilibili: BilibiliConfig::default(),
            livestream: LivestreamConfig::default(),
            cache_max_entries: 1_000,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("FANS_HOME_TEST_PORT", "not-a-number");
        let port: u16 = env_or("FANS_HOME_TEST_PORT", 8000);
        assert_eq!(port, 8000);
    }

    #[test]
    fn test_for_media_root_has_no_admin_token() {
        let config = AppConfig::for_media_root("sqlite::memory:", "/tmp/media");
        assert!(config.admin_token.is_none());
        assert_eq!(config.livestream.min_year, 2019);
        assert_eq!(config.bilibili.retry_times, 3);
    }
}
