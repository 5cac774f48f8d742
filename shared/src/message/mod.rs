//! 跨标签页同步消息类型定义
//!
//! Wire types for the cross-context broadcast channel. Every message is a
//! full-replace snapshot of one collection, never a diff: the receiving tab
//! treats the payload as authoritative.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::models::{Product, ProductId};

/// Channel carrying catalog collections (remote, local, categories)
pub const PRODUCTS_CHANNEL: &str = "productos-sync";
/// Channel carrying the favorites set
pub const FAVORITES_CHANNEL: &str = "favoritos-sync";
/// Heartbeat channel used by the presence tracker
pub const PRESENCE_CHANNEL: &str = "tab-count";

/// Durable store keys
pub mod keys {
    pub const FAVORITES: &str = "app_favoritos";
    pub const REMOTE_PRODUCTS: &str = "productos_api";
    pub const LOCAL_PRODUCTS: &str = "productos_locales";
    pub const CATEGORIES: &str = "categorias_api";
    pub const LAST_FETCH: &str = "last_api_update";
    /// Highest local id ever allocated in this origin
    pub const LOCAL_ID_SEQUENCE: &str = "productos_locales_seq";
}

/// Per-tab origin identifier (random, regenerated on every page load)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(Uuid);

impl TabId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // short form is enough to tell tabs apart in logs
        let full = self.0.simple().to_string();
        write!(f, "{}", &full[..8])
    }
}

/// Synchronized collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Collection {
    RemoteProducts,
    LocalProducts,
    Categories,
    Favorites,
}

impl Collection {
    pub fn storage_key(&self) -> &'static str {
        match self {
            Collection::RemoteProducts => keys::REMOTE_PRODUCTS,
            Collection::LocalProducts => keys::LOCAL_PRODUCTS,
            Collection::Categories => keys::CATEGORIES,
            Collection::Favorites => keys::FAVORITES,
        }
    }

    pub fn from_storage_key(key: &str) -> Option<Self> {
        match key {
            keys::REMOTE_PRODUCTS => Some(Collection::RemoteProducts),
            keys::LOCAL_PRODUCTS => Some(Collection::LocalProducts),
            keys::CATEGORIES => Some(Collection::Categories),
            keys::FAVORITES => Some(Collection::Favorites),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::RemoteProducts => write!(f, "remote_products"),
            Collection::LocalProducts => write!(f, "local_products"),
            Collection::Categories => write!(f, "categories"),
            Collection::Favorites => write!(f, "favorites"),
        }
    }
}

/// 同步消息 - tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum SyncMessage {
    CatalogUpdated { payload: Vec<Product> },
    LocalProductsUpdated { payload: Vec<Product> },
    CategoriesUpdated { payload: Vec<String> },
    FavoritesUpdated { payload: Vec<ProductId> },
    PresencePing { timestamp: i64 },
    /// Synthesized by the storage-event fallback for keys without a typed variant
    StorageUpdated { key: String, data: serde_json::Value },
}

impl SyncMessage {
    /// Collection replaced by this message, if any
    pub fn collection(&self) -> Option<Collection> {
        match self {
            SyncMessage::CatalogUpdated { .. } => Some(Collection::RemoteProducts),
            SyncMessage::LocalProductsUpdated { .. } => Some(Collection::LocalProducts),
            SyncMessage::CategoriesUpdated { .. } => Some(Collection::Categories),
            SyncMessage::FavoritesUpdated { .. } => Some(Collection::Favorites),
            SyncMessage::PresencePing { .. } | SyncMessage::StorageUpdated { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::CatalogUpdated { .. } => "catalog-updated",
            SyncMessage::LocalProductsUpdated { .. } => "local-products-updated",
            SyncMessage::CategoriesUpdated { .. } => "categories-updated",
            SyncMessage::FavoritesUpdated { .. } => "favorites-updated",
            SyncMessage::PresencePing { .. } => "presence-ping",
            SyncMessage::StorageUpdated { .. } => "storage-updated",
        }
    }

    /// Build the equivalent message for a storage mutation made by another tab
    ///
    /// Known keys map to their typed variant when the value has the expected
    /// shape; anything else becomes `StorageUpdated`.
    pub fn from_storage(key: &str, data: serde_json::Value) -> Self {
        let typed = match Collection::from_storage_key(key) {
            Some(Collection::RemoteProducts) => serde_json::from_value(data.clone())
                .ok()
                .map(|payload| SyncMessage::CatalogUpdated { payload }),
            Some(Collection::LocalProducts) => serde_json::from_value(data.clone())
                .ok()
                .map(|payload| SyncMessage::LocalProductsUpdated { payload }),
            Some(Collection::Categories) => serde_json::from_value(data.clone())
                .ok()
                .map(|payload| SyncMessage::CategoriesUpdated { payload }),
            Some(Collection::Favorites) => serde_json::from_value(data.clone())
                .ok()
                .map(|payload| SyncMessage::FavoritesUpdated { payload }),
            None => None,
        };
        typed.unwrap_or_else(|| SyncMessage::StorageUpdated {
            key: key.to_string(),
            data,
        })
    }
}

/// Message as it travels on a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEnvelope {
    /// Sending tab
    pub origin: TabId,
    /// Sender's Lamport clock at send time
    pub clock: u64,
    /// Sender wall clock (millis)
    pub sent_at: i64,
    pub message: SyncMessage,
}

impl SyncEnvelope {
    pub fn new(origin: TabId, clock: u64, message: SyncMessage) -> Self {
        Self {
            origin,
            clock,
            sent_at: crate::util::now_millis(),
            message,
        }
    }

    pub fn is_from(&self, origin: TabId) -> bool {
        self.origin == origin
    }
}
