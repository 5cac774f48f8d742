// catalog-sync/tests/common/mod.rs
// 集成测试公共工具

#![allow(dead_code)]

use async_trait::async_trait;
use catalog_sync::upstream::{ProductSource, UpstreamError, UpstreamResult};
use catalog_sync::{BroadcastHub, Config, Origin, SharedStorage, StorageKind, SyncPolicy};
use parking_lot::Mutex;
use shared::models::{ProductDraft, Rating, RemoteProduct};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

/// Upstream double serving fixed data
#[derive(Debug, Default)]
pub struct FakeUpstream {
    products: Mutex<Vec<RemoteProduct>>,
    categories: Mutex<Vec<String>>,
    offline: Mutex<bool>,
}

impl FakeUpstream {
    pub fn with_ids(ids: impl IntoIterator<Item = i64>) -> Arc<Self> {
        let products = ids
            .into_iter()
            .map(|id| remote(id, if id % 2 == 0 { "electronics" } else { "jewelery" }))
            .collect();
        Arc::new(Self {
            products: Mutex::new(products),
            categories: Mutex::new(vec!["electronics".into(), "jewelery".into()]),
            offline: Mutex::new(false),
        })
    }

    pub fn set_offline(&self, offline: bool) {
        *self.offline.lock() = offline;
    }
}

#[async_trait]
impl ProductSource for FakeUpstream {
    async fn fetch_products(&self) -> UpstreamResult<Vec<RemoteProduct>> {
        if *self.offline.lock() {
            return Err(UpstreamError::Timeout(10_000));
        }
        Ok(self.products.lock().clone())
    }

    async fn fetch_categories(&self) -> UpstreamResult<Vec<String>> {
        if *self.offline.lock() {
            return Err(UpstreamError::Timeout(10_000));
        }
        Ok(self.categories.lock().clone())
    }
}

pub fn remote(id: i64, category: &str) -> RemoteProduct {
    RemoteProduct {
        id,
        title: format!("Producto {id}"),
        description: format!("Descripción {id}"),
        price: 9.5 * id as f64,
        category: category.to_string(),
        image: String::new(),
        rating: Some(Rating { rate: 3.9, count: 70 }),
    }
}

pub fn draft(name: &str) -> ProductDraft {
    ProductDraft {
        name: name.to_string(),
        description: "Hecho a mano en el taller".to_string(),
        price: "$1,299.00".to_string(),
        category: "Artesanía".to_string(),
        image_url: String::new(),
    }
}

/// In-memory config with a fast heartbeat
pub fn test_config(native: bool, policy: SyncPolicy) -> Config {
    let mut config = Config::with_overrides("./target/test-data", "http://127.0.0.1:9");
    config.storage_backend = StorageKind::Memory;
    config.broadcast_native = native;
    config.sync_policy = policy;
    config.presence_ping_ms = 40;
    config.presence_ttl_ms = 200;
    config.max_favorites = 50;
    config.stale_window_ms = 30 * 60 * 1000;
    config
}

pub fn origin_with(config: Config, storage: SharedStorage, upstream: Arc<FakeUpstream>) -> Origin {
    let hub = BroadcastHub::from_config(config.hub_config());
    Origin::with_parts(config, hub, storage, upstream)
}

pub fn origin(native: bool, upstream: Arc<FakeUpstream>) -> Origin {
    origin_with(
        test_config(native, SyncPolicy::ArrivalOrder),
        SharedStorage::in_memory(),
        upstream,
    )
}

/// Poll `cond` for up to two seconds
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

/// Let in-flight deliveries settle
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

/// Count storage events over `window`, lagged ones included
pub async fn count_storage_events(storage: &SharedStorage, window: Duration) -> u64 {
    let mut rx = storage.subscribe();
    let deadline = tokio::time::sleep(window);
    tokio::pin!(deadline);
    let mut count = 0;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            result = rx.recv() => match result {
                Ok(_) => count += 1,
                Err(RecvError::Lagged(n)) => count += n,
                Err(RecvError::Closed) => break,
            },
        }
    }
    count
}
