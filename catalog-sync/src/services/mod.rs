//! Per-tab services
//!
//! | Service | Channel | Persisted keys |
//! |---------|---------|----------------|
//! | CatalogService | productos-sync | productos_api, productos_locales, categorias_api, last_api_update |
//! | FavoritesService | favoritos-sync | app_favoritos |
//! | PresenceTracker | tab-count | (none) |

pub mod catalog_service;
pub mod favorites_service;
pub mod presence;

pub use catalog_service::{
    ALL_CATEGORIES, CacheMetadata, CacheState, CatalogConfig, CatalogService, CatalogStatistics,
    DEFAULT_STALE_WINDOW_MS, ProductQuery, RefreshReport, SortBy,
};
pub use favorites_service::{DEFAULT_MAX_FAVORITES, FavoritesService};
pub use presence::{PresenceConfig, PresenceStatus, PresenceTracker, SyncStatus};
