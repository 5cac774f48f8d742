use std::path::PathBuf;
use std::time::Duration;

use shared::models::CategoryLabels;

use crate::message::{HubConfig, SyncPolicy};
use crate::services::{CatalogConfig, PresenceConfig};

/// Durable store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    /// redb file under `WORK_DIR`
    Redb,
    Memory,
}

impl StorageKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "redb" => Some(StorageKind::Redb),
            "memory" => Some(StorageKind::Memory),
            _ => None,
        }
    }
}

/// 同步配置 - every tunable of the sync subsystem
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | ./data | 工作目录 (store file, logs) |
/// | API_BASE_URL | https://fakestoreapi.com | 上游商品 API |
/// | REQUEST_TIMEOUT_MS | 10000 | 请求超时(毫秒) |
/// | STALE_WINDOW_MS | 1800000 | 缓存过期窗口(毫秒) |
/// | MAX_FAVORITES | 50 | 收藏上限 |
/// | PRESENCE_PING_MS | 5000 | 心跳间隔(毫秒) |
/// | PRESENCE_TTL_MS | 10000 | 心跳超时(毫秒) |
/// | BROADCAST_NATIVE | true | false = storage-event fallback |
/// | SYNC_POLICY | arrival | arrival \| logical-clock |
/// | STORAGE_BACKEND | redb | redb \| memory |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_JSON | false | JSON 日志 |
/// | ENVIRONMENT | development | 运行环境 |
///
/// # 示例
///
/// ```ignore
/// SYNC_POLICY=logical-clock BROADCAST_NATIVE=false cargo run -p catalog-sync
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储数据库和日志
    pub work_dir: String,
    pub api_base_url: String,
    pub request_timeout_ms: u64,
    pub stale_window_ms: i64,
    pub max_favorites: usize,
    pub presence_ping_ms: u64,
    pub presence_ttl_ms: u64,
    /// false simulates a runtime without the broadcast primitive
    pub broadcast_native: bool,
    pub sync_policy: SyncPolicy,
    pub storage_backend: StorageKind,
    pub log_level: String,
    pub log_json: bool,
    /// 运行环境: development | staging | production
    pub environment: String,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "./data".into()),
            api_base_url: std::env::var("API_BASE_URL")
                .unwrap_or_else(|_| "https://fakestoreapi.com".into()),
            request_timeout_ms: env_parse("REQUEST_TIMEOUT_MS").unwrap_or(10_000),
            stale_window_ms: env_parse("STALE_WINDOW_MS").unwrap_or(30 * 60 * 1000),
            max_favorites: env_parse("MAX_FAVORITES").unwrap_or(50),
            presence_ping_ms: env_parse("PRESENCE_PING_MS").unwrap_or(5_000),
            presence_ttl_ms: env_parse("PRESENCE_TTL_MS").unwrap_or(10_000),
            broadcast_native: env_parse("BROADCAST_NATIVE").unwrap_or(true),
            sync_policy: env_parse("SYNC_POLICY").unwrap_or_default(),
            storage_backend: std::env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|v| StorageKind::parse(&v))
                .unwrap_or(StorageKind::Redb),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            log_json: env_parse("LOG_JSON").unwrap_or(false),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        }
    }

    /// 使用自定义值覆盖部分配置
    ///
    /// 常用于测试场景: in-memory store, given upstream
    pub fn with_overrides(work_dir: impl Into<String>, api_base_url: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.work_dir = work_dir.into();
        config.api_base_url = api_base_url.into();
        config.storage_backend = StorageKind::Memory;
        config
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// redb file for the origin store
    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("storage.redb")
    }

    pub fn log_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir).join("logs")
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            native: self.broadcast_native,
            ..HubConfig::default()
        }
    }

    pub fn catalog_config(&self) -> CatalogConfig {
        CatalogConfig {
            stale_window_ms: self.stale_window_ms,
            labels: CategoryLabels::default(),
        }
    }

    pub fn presence_config(&self) -> PresenceConfig {
        PresenceConfig {
            // tokio 的 interval 不接受 0
            ping_interval: Duration::from_millis(self.presence_ping_ms.max(1)),
            peer_ttl: Duration::from_millis(self.presence_ttl_ms),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
