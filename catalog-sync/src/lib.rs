//! Catalog Sync - 客户端状态同步与缓存
//!
//! # 架构概述
//!
//! One process hosts any number of "tabs" (independent execution contexts)
//! of the same origin. Tabs share a durable store and a broadcast hub; each
//! owns its in-memory copy of the catalog and favorites.
//!
//! - **存储** (`storage`): origin-scoped key/value store (redb or memory)
//!   with storage events
//! - **广播** (`message`): named cross-tab channels with a storage-event
//!   fallback, Lamport clocks and the inbound ordering policy
//! - **服务** (`services`): catalog cache, favorites set, presence tracker
//! - **上游** (`upstream`): product API client
//! - **核心** (`core`): configuration and the `Origin` / `TabContext`
//!   composition root
//!
//! # 模块结构
//!
//! ```text
//! catalog-sync/src/
//! ├── common/        # 错误、日志
//! ├── core/          # 配置、组合
//! ├── message/       # 广播通道
//! ├── services/      # 目录、收藏、在线状态
//! ├── storage/       # 持久化存储
//! └── upstream/      # 上游 API
//! ```

pub mod common;
pub mod core;
pub mod message;
pub mod services;
pub mod storage;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;

// Re-export 公共类型
pub use common::{AppError, AppResult};
pub use core::{Config, Origin, StorageKind, TabContext};
pub use message::{BroadcastHub, HubConfig, LamportClock, SyncChannel, SyncGate, SyncPolicy};
pub use services::{
    CacheState, CatalogService, CatalogStatistics, FavoritesService, PresenceStatus,
    PresenceTracker, ProductQuery, RefreshReport, SortBy, SyncStatus,
};
pub use storage::{LocalStore, SharedStorage, StorageEvent};
pub use upstream::{HttpProductSource, ProductSource, UpstreamError};

// Re-export logger functions
pub use common::logger::{cleanup_old_logs, init_logger, init_logger_with_file};
