//! Catalog Service - remote/local product cache with a staleness policy
//!
//! Holds two product collections per tab:
//! - remote: read-only mirror of the upstream API, replaced wholesale on refresh
//! - local: user-authored products, mutable by id
//!
//! Every change is persisted to the origin store and broadcast on
//! `productos-sync` as a full snapshot. Inbound snapshots replace the
//! matching collection in memory, never rebroadcast and never written back.

use parking_lot::RwLock;
use serde::Serialize;
use shared::message::{Collection, SyncEnvelope, SyncMessage, keys};
use shared::models::{CategoryLabels, Product, ProductDraft, ProductId, ProductPatch};
use shared::util::{format_local_millis, now_millis};
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::common::logger::SYNC_TARGET;
use crate::common::{AppError, AppResult};
use crate::message::{SyncChannel, SyncGate};
use crate::storage::LocalStore;
use crate::upstream::ProductSource;

/// 30 minutes
pub const DEFAULT_STALE_WINDOW_MS: i64 = 30 * 60 * 1000;

/// Local ids start right above this
const LOCAL_ID_FLOOR: ProductId = 999;

/// Category filter value meaning "no filter"
pub const ALL_CATEGORIES: &str = "todas";

const NEVER_FETCHED: &str = "Nunca";

// =============================================================================
// Types
// =============================================================================

/// Cache lifecycle of the remote collections
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// Never fetched (or cache cleared)
    Empty,
    Fresh,
    Stale,
}

/// Last successful fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    pub last_fetched_at_epoch_millis: Option<i64>,
}

impl CacheMetadata {
    pub fn fetched_at(millis: i64) -> Self {
        Self {
            last_fetched_at_epoch_millis: Some(millis),
        }
    }

    pub fn state_at(&self, now: i64, stale_window_ms: i64) -> CacheState {
        match self.last_fetched_at_epoch_millis {
            None => CacheState::Empty,
            Some(at) if now - at > stale_window_ms => CacheState::Stale,
            Some(_) => CacheState::Fresh,
        }
    }

    /// Empty counts as stale: there is nothing fresh to serve
    pub fn is_stale_at(&self, now: i64, stale_window_ms: i64) -> bool {
        self.state_at(now, stale_window_ms) != CacheState::Fresh
    }
}

/// Catalog configuration
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub stale_window_ms: i64,
    /// Upstream category -> display label
    pub labels: CategoryLabels,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            stale_window_ms: DEFAULT_STALE_WINDOW_MS,
            labels: CategoryLabels::default(),
        }
    }
}

/// Sort key for `filter`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Name,
    Price,
    Category,
}

/// Combined category + search + sort query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductQuery {
    /// `None` or `"todas"` = every category
    pub category: Option<String>,
    pub term: Option<String>,
    pub sort: Option<SortBy>,
}

impl ProductQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.term = Some(term.into());
        self
    }

    pub fn sort_by(mut self, sort: SortBy) -> Self {
        self.sort = Some(sort);
        self
    }
}

/// Catalog statistics for status panels
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStatistics {
    pub total: usize,
    pub remote_count: usize,
    pub local_count: usize,
    pub category_count: usize,
    /// Local time of the last fetch, or "Nunca"
    pub last_fetched_display: String,
    pub is_stale: bool,
    pub needs_update: bool,
}

/// Result of `load` / `refresh`
///
/// Network failures never abort: the report carries whatever is being served
/// plus the error.
#[derive(Debug, Clone)]
pub struct RefreshReport {
    /// Merged catalog after the operation
    pub products: Vec<Product>,
    pub categories: Vec<String>,
    /// true = remote products come from the persisted cache, not a fetch
    pub from_cache: bool,
    pub error: Option<AppError>,
}

impl RefreshReport {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
struct CatalogState {
    remote: Vec<Product>,
    local: Vec<Product>,
    /// Remote category labels
    categories: Vec<String>,
    meta: CacheMetadata,
}

impl CatalogState {
    fn all(&self) -> impl Iterator<Item = &Product> {
        self.remote.iter().chain(self.local.iter())
    }

    fn max_id(&self) -> Option<ProductId> {
        self.all().map(|p| p.id).max()
    }
}

/// Decrements the in-flight counter when a fetch ends, however it ends
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// =============================================================================
// CatalogService
// =============================================================================

/// Per-tab catalog cache
#[derive(Clone)]
pub struct CatalogService {
    store: LocalStore,
    channel: Arc<SyncChannel>,
    gate: Arc<SyncGate>,
    source: Arc<dyn ProductSource>,
    config: Arc<CatalogConfig>,
    state: Arc<RwLock<CatalogState>>,
    last_error: Arc<RwLock<Option<AppError>>>,
    in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for CatalogService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("CatalogService")
            .field("remote_count", &state.remote.len())
            .field("local_count", &state.local.len())
            .field("categories_count", &state.categories.len())
            .field("last_fetched", &state.meta.last_fetched_at_epoch_millis)
            .finish()
    }
}

impl CatalogService {
    /// Create the service, hydrating from the persisted store
    pub fn new(
        store: LocalStore,
        channel: Arc<SyncChannel>,
        gate: Arc<SyncGate>,
        source: Arc<dyn ProductSource>,
        config: CatalogConfig,
    ) -> Self {
        let state = CatalogState {
            remote: store.read(keys::REMOTE_PRODUCTS, Vec::new()),
            local: store.read(keys::LOCAL_PRODUCTS, Vec::new()),
            categories: store.read(keys::CATEGORIES, Vec::new()),
            meta: CacheMetadata {
                last_fetched_at_epoch_millis: store.read(keys::LAST_FETCH, None),
            },
        };
        tracing::debug!(
            remote = state.remote.len(),
            local = state.local.len(),
            categories = state.categories.len(),
            "Catalog hydrated from store"
        );
        Self {
            store,
            channel,
            gate,
            source,
            config: Arc::new(config),
            state: Arc::new(RwLock::new(state)),
            last_error: Arc::new(RwLock::new(None)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    // ========== Cache lifecycle ==========

    /// Startup decision: serve the persisted catalog when present and fresh,
    /// otherwise refresh
    pub async fn load(&self) -> RefreshReport {
        let serve_cached = {
            let state = self.state.read();
            !state.remote.is_empty()
                && !state
                    .meta
                    .is_stale_at(now_millis(), self.config.stale_window_ms)
        };
        if serve_cached {
            tracing::info!("📦 Serving catalog from cache");
            return RefreshReport {
                products: self.get_all(),
                categories: self.get_categories(),
                from_cache: true,
                error: None,
            };
        }
        self.refresh().await
    }

    /// Re-fetch remote products and categories
    ///
    /// Products, categories and the fetch timestamp are committed under one
    /// write lock, so concurrent refreshes never leave the timestamp
    /// describing a different payload. The last refresh to commit wins.
    pub async fn refresh(&self) -> RefreshReport {
        let _loading = LoadingGuard::enter(&self.in_flight);
        tracing::info!("📦 Refreshing catalog from upstream");

        let (products, categories) =
            futures::future::join(self.source.fetch_products(), self.source.fetch_categories())
                .await;

        let labels = &self.config.labels;
        let mut error: Option<AppError> = None;
        let mut state = self.state.write();

        let products_fetched = match products {
            Ok(raw) => {
                state.remote = raw.into_iter().map(|p| p.into_product(labels)).collect();
                state.meta = CacheMetadata::fetched_at(now_millis());
                self.store.write(keys::REMOTE_PRODUCTS, &state.remote);
                self.store
                    .write(keys::LAST_FETCH, &state.meta.last_fetched_at_epoch_millis);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, cached = state.remote.len(), "Product fetch failed, serving cache");
                error = Some(e.into());
                false
            }
        };

        let categories_fetched = match categories {
            Ok(raw) => {
                state.categories = dedup(raw.iter().map(|c| labels.label(c)));
                self.store.write(keys::CATEGORIES, &state.categories);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Category fetch failed");
                if state.categories.is_empty() {
                    state.categories = CategoryLabels::fallback_categories();
                    self.store.write(keys::CATEGORIES, &state.categories);
                }
                if error.is_none() {
                    error = Some(e.into());
                }
                false
            }
        };

        if products_fetched {
            self.broadcast(
                Collection::RemoteProducts,
                SyncMessage::CatalogUpdated {
                    payload: state.remote.clone(),
                },
            );
        }
        if categories_fetched {
            self.broadcast(
                Collection::Categories,
                SyncMessage::CategoriesUpdated {
                    payload: state.categories.clone(),
                },
            );
        }

        let report = RefreshReport {
            products: state.all().cloned().collect(),
            categories: merged_categories(&state),
            from_cache: !products_fetched,
            error,
        };
        drop(state);

        *self.last_error.write() = report.error.clone();
        if report.is_ok() {
            tracing::info!(
                products = report.products.len(),
                categories = report.categories.len(),
                "📦 Catalog refreshed"
            );
        }
        report
    }

    /// Drop remote products, categories and the fetch timestamp
    pub fn clear_remote_cache(&self) {
        let mut state = self.state.write();
        state.remote.clear();
        state.categories.clear();
        state.meta = CacheMetadata::default();

        self.store.write(keys::REMOTE_PRODUCTS, &state.remote);
        self.store.write(keys::CATEGORIES, &state.categories);
        self.store.remove(keys::LAST_FETCH);

        self.broadcast(
            Collection::RemoteProducts,
            SyncMessage::CatalogUpdated { payload: vec![] },
        );
        self.broadcast(
            Collection::Categories,
            SyncMessage::CategoriesUpdated { payload: vec![] },
        );
        tracing::info!("Remote catalog cache cleared");
    }

    pub fn metadata(&self) -> CacheMetadata {
        self.state.read().meta
    }

    pub fn cache_state(&self) -> CacheState {
        self.metadata()
            .state_at(now_millis(), self.config.stale_window_ms)
    }

    pub fn is_stale(&self) -> bool {
        self.metadata()
            .is_stale_at(now_millis(), self.config.stale_window_ms)
    }

    /// Same as `is_stale`: the question the UI asks before offering a refresh
    pub fn needs_update(&self) -> bool {
        self.is_stale()
    }

    /// true while a fetch is in flight
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Error from the last refresh, cleared by the next successful one
    pub fn last_error(&self) -> Option<AppError> {
        self.last_error.read().clone()
    }

    // ========== Queries ==========

    /// Remote first, then local, each in fetch/creation order
    pub fn get_all(&self) -> Vec<Product> {
        self.state.read().all().cloned().collect()
    }

    pub fn get_remote(&self) -> Vec<Product> {
        self.state.read().remote.clone()
    }

    pub fn get_local(&self) -> Vec<Product> {
        self.state.read().local.clone()
    }

    pub fn get_by_id(&self, id: ProductId) -> Option<Product> {
        self.state.read().all().find(|p| p.id == id).cloned()
    }

    pub fn get_by_category(&self, category: &str) -> Vec<Product> {
        self.state
            .read()
            .all()
            .filter(|p| p.category == category)
            .cloned()
            .collect()
    }

    /// Remote categories plus any used by local products, deduplicated
    pub fn get_categories(&self) -> Vec<String> {
        merged_categories(&self.state.read())
    }

    /// Case-insensitive match over name, description and category
    pub fn search(&self, term: &str) -> Vec<Product> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return self.get_all();
        }
        self.state
            .read()
            .all()
            .filter(|p| p.matches_term(&term))
            .cloned()
            .collect()
    }

    pub fn filter(&self, query: &ProductQuery) -> Vec<Product> {
        let term = query
            .term
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .unwrap_or_default();
        let category = query
            .category
            .as_deref()
            .filter(|c| !c.is_empty() && *c != ALL_CATEGORIES);

        let mut products: Vec<Product> = self
            .state
            .read()
            .all()
            .filter(|p| category.is_none_or(|c| p.category == c))
            .filter(|p| term.is_empty() || p.matches_term(&term))
            .cloned()
            .collect();

        if let Some(sort) = query.sort {
            products.sort_by(|a, b| compare(a, b, sort));
        }
        products
    }

    pub fn get_statistics(&self) -> CatalogStatistics {
        self.statistics_at(now_millis())
    }

    /// Statistics evaluated at a given instant
    pub fn statistics_at(&self, now: i64) -> CatalogStatistics {
        let state = self.state.read();
        let is_stale = state.meta.is_stale_at(now, self.config.stale_window_ms);
        let last_fetched_display = state
            .meta
            .last_fetched_at_epoch_millis
            .and_then(format_local_millis)
            .unwrap_or_else(|| NEVER_FETCHED.to_string());
        CatalogStatistics {
            total: state.remote.len() + state.local.len(),
            remote_count: state.remote.len(),
            local_count: state.local.len(),
            category_count: merged_categories(&state).len(),
            last_fetched_display,
            is_stale,
            needs_update: is_stale,
        }
    }

    // ========== Local products ==========

    /// Create a local product
    ///
    /// id = max(every known id, 999, highest local id ever issued) + 1
    pub fn create_local(&self, draft: ProductDraft) -> AppResult<Product> {
        draft.validate()?;

        let mut state = self.state.write();
        let issued: ProductId = self.store.read(keys::LOCAL_ID_SEQUENCE, 0);
        let id = state
            .max_id()
            .unwrap_or(LOCAL_ID_FLOOR)
            .max(LOCAL_ID_FLOOR)
            .max(issued)
            + 1;
        let product = draft.into_product(id)?;

        state.local.push(product.clone());
        self.commit_local(&state.local);
        self.store.write(keys::LOCAL_ID_SEQUENCE, &id);

        tracing::info!(id, name = %product.name, "Local product created");
        Ok(product)
    }

    /// Merge `patch` into a local product
    pub fn update_local(&self, id: ProductId, patch: ProductPatch) -> AppResult<Product> {
        patch.validate()?;

        let mut state = self.state.write();
        let product = state
            .local
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(AppError::NotEditable(id))?;
        patch.apply_to(product);
        let updated = product.clone();

        self.commit_local(&state.local);
        tracing::info!(id, "Local product updated");
        Ok(updated)
    }

    pub fn delete_local(&self, id: ProductId) -> AppResult<()> {
        let mut state = self.state.write();
        let index = state
            .local
            .iter()
            .position(|p| p.id == id)
            .ok_or(AppError::NotEditable(id))?;
        state.local.remove(index);

        self.commit_local(&state.local);
        tracing::info!(id, "Local product deleted");
        Ok(())
    }

    /// Delete every local product
    pub fn clear_local(&self) -> AppResult<()> {
        let mut state = self.state.write();
        if state.local.is_empty() {
            return Err(AppError::nothing_to_delete("No hay productos locales para eliminar"));
        }
        let removed = state.local.len();
        state.local.clear();

        self.commit_local(&state.local);
        tracing::info!(removed, "Local products cleared");
        Ok(())
    }

    /// Persist (one key, one write) and broadcast the local collection
    fn commit_local(&self, local: &[Product]) {
        self.store.write(keys::LOCAL_PRODUCTS, local);
        self.broadcast(
            Collection::LocalProducts,
            SyncMessage::LocalProductsUpdated {
                payload: local.to_vec(),
            },
        );
    }

    // ========== Cross-tab sync ==========

    fn broadcast(&self, collection: Collection, message: SyncMessage) {
        if let Some(clock) = self.channel.send(message) {
            self.gate
                .record_local(collection, clock, self.store.origin());
        }
    }

    /// Apply a snapshot from another tab
    ///
    /// Replaces the matching collection in memory only: the sender has
    /// already written it to the shared store. Returns false when the
    /// message does not concern the catalog or the ordering policy rejected
    /// it as older than what this tab already has.
    pub fn apply_inbound(&self, envelope: &SyncEnvelope) -> bool {
        match &envelope.message {
            SyncMessage::CatalogUpdated { payload } => {
                if !self.gate.admit(Collection::RemoteProducts, envelope) {
                    return self.skip_stale(Collection::RemoteProducts, envelope);
                }
                let mut state = self.state.write();
                state.remote = payload.clone();
                // the sender wrote the timestamp before broadcasting
                state.meta = CacheMetadata {
                    last_fetched_at_epoch_millis: self.store.read(keys::LAST_FETCH, None),
                };
            }
            SyncMessage::LocalProductsUpdated { payload } => {
                if !self.gate.admit(Collection::LocalProducts, envelope) {
                    return self.skip_stale(Collection::LocalProducts, envelope);
                }
                self.state.write().local = payload.clone();
            }
            SyncMessage::CategoriesUpdated { payload } => {
                if !self.gate.admit(Collection::Categories, envelope) {
                    return self.skip_stale(Collection::Categories, envelope);
                }
                self.state.write().categories = payload.clone();
            }
            SyncMessage::StorageUpdated { key, data } if key == keys::LAST_FETCH => {
                self.state.write().meta = CacheMetadata {
                    last_fetched_at_epoch_millis: data.as_i64(),
                };
            }
            _ => return false,
        }
        tracing::debug!(
            target: SYNC_TARGET,
            kind = envelope.message.kind(),
            from = %envelope.origin,
            clock = envelope.clock,
            "Inbound catalog snapshot applied"
        );
        true
    }

    /// Drop an older snapshot. Its sender already wrote it to the shared
    /// store, so the winning collection is written back over it.
    fn skip_stale(&self, collection: Collection, envelope: &SyncEnvelope) -> bool {
        tracing::debug!(
            target: SYNC_TARGET,
            kind = envelope.message.kind(),
            from = %envelope.origin,
            clock = envelope.clock,
            "Older snapshot dropped"
        );
        let state = self.state.read();
        match collection {
            Collection::RemoteProducts => {
                self.store.write(keys::REMOTE_PRODUCTS, &state.remote);
                match state.meta.last_fetched_at_epoch_millis {
                    Some(at) => {
                        self.store.write(keys::LAST_FETCH, &at);
                    }
                    None => {
                        self.store.remove(keys::LAST_FETCH);
                    }
                }
            }
            Collection::LocalProducts => {
                self.store.write(keys::LOCAL_PRODUCTS, &state.local);
            }
            Collection::Categories => {
                self.store.write(keys::CATEGORIES, &state.categories);
            }
            Collection::Favorites => {}
        }
        false
    }
}

fn merged_categories(state: &CatalogState) -> Vec<String> {
    dedup(
        state
            .categories
            .iter()
            .cloned()
            .chain(state.local.iter().map(|p| p.category.clone())),
    )
}

/// Keep first occurrences
fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}

fn compare(a: &Product, b: &Product, sort: SortBy) -> CmpOrdering {
    match sort {
        SortBy::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        // unparsable prices sort last
        SortBy::Price => match (a.price_value(), b.price_value()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => CmpOrdering::Less,
            (None, Some(_)) => CmpOrdering::Greater,
            (None, None) => CmpOrdering::Equal,
        },
        SortBy::Category => a.category.to_lowercase().cmp(&b.category.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BroadcastHub, LamportClock, SyncPolicy};
    use crate::storage::SharedStorage;
    use crate::testing::{StaticSource, remote};
    use shared::message::{PRODUCTS_CHANNEL, TabId};

    struct Fixture {
        catalog: CatalogService,
        source: Arc<StaticSource>,
        storage: SharedStorage,
        hub: BroadcastHub,
    }

    fn fixture_with(source: StaticSource, storage: SharedStorage, hub: BroadcastHub) -> Fixture {
        fixture_with_policy(source, storage, hub, SyncPolicy::ArrivalOrder)
    }

    fn fixture_with_policy(
        source: StaticSource,
        storage: SharedStorage,
        hub: BroadcastHub,
        policy: SyncPolicy,
    ) -> Fixture {
        let source = Arc::new(source);
        let origin = TabId::new();
        let channel = Arc::new(SyncChannel::open(
            PRODUCTS_CHANNEL,
            origin,
            &hub,
            Some(&storage),
            Arc::new(LamportClock::new()),
        ));
        let catalog = CatalogService::new(
            storage.handle(origin),
            channel,
            Arc::new(SyncGate::new(policy)),
            source.clone(),
            CatalogConfig::default(),
        );
        Fixture {
            catalog,
            source,
            storage,
            hub,
        }
    }

    fn fixture(ids: impl IntoIterator<Item = i64>) -> Fixture {
        fixture_with(
            StaticSource::with_ids(ids),
            SharedStorage::in_memory(),
            BroadcastHub::new(),
        )
    }

    fn draft(name: &str, category: &str) -> ProductDraft {
        ProductDraft {
            name: name.to_string(),
            description: "Producto hecho a mano".to_string(),
            price: "19.99".to_string(),
            category: category.to_string(),
            image_url: String::new(),
        }
    }

    #[test]
    fn test_staleness_threshold() {
        let now = 1_700_000_000_000;
        let minute = 60 * 1000;
        let window = DEFAULT_STALE_WINDOW_MS;

        assert!(CacheMetadata::fetched_at(now - 31 * minute).is_stale_at(now, window));
        assert!(!CacheMetadata::fetched_at(now - 29 * minute).is_stale_at(now, window));
        assert_eq!(CacheMetadata::default().state_at(now, window), CacheState::Empty);
        assert_eq!(
            CacheMetadata::fetched_at(now).state_at(now, window),
            CacheState::Fresh
        );
    }

    #[tokio::test]
    async fn test_refresh_populates_and_persists() {
        let f = fixture([1, 2, 3]);
        assert_eq!(f.catalog.cache_state(), CacheState::Empty);

        let report = f.catalog.refresh().await;
        assert!(report.is_ok());
        assert!(!report.from_cache);
        assert_eq!(report.products.len(), 3);
        assert_eq!(f.catalog.cache_state(), CacheState::Fresh);
        assert!(!f.catalog.is_loading());

        let store = f.storage.handle(TabId::new());
        assert_eq!(store.read::<Vec<Product>>(keys::REMOTE_PRODUCTS, vec![]).len(), 3);
        assert!(store.read::<Option<i64>>(keys::LAST_FETCH, None).is_some());
        assert!(f.catalog.get_categories().contains(&"Electrónicos".to_string()));
    }

    #[tokio::test]
    async fn test_refresh_maps_upstream_shape() {
        let f = fixture_with(
            StaticSource::new(vec![remote(7, "electronics")], vec!["electronics", "garden"]),
            SharedStorage::in_memory(),
            BroadcastHub::new(),
        );
        f.catalog.refresh().await;

        let product = f.catalog.get_by_id(7).unwrap();
        assert_eq!(product.name, "Producto 7");
        assert_eq!(product.price, "$17.00");
        assert_eq!(product.category, "Electrónicos");
        assert!(!product.is_local);
        assert_eq!(
            f.catalog.get_categories(),
            vec!["Electrónicos".to_string(), "Garden".to_string()]
        );
    }

    #[tokio::test]
    async fn test_load_serves_fresh_cache_without_fetching() {
        let storage = SharedStorage::in_memory();
        let first = fixture_with(StaticSource::with_ids([1, 2]), storage.clone(), BroadcastHub::new());
        first.catalog.refresh().await;
        assert_eq!(first.source.calls(), 1);

        let second = fixture_with(StaticSource::with_ids([1, 2]), storage, BroadcastHub::new());
        let report = second.catalog.load().await;
        assert!(report.from_cache);
        assert_eq!(report.products.len(), 2);
        assert_eq!(second.source.calls(), 0);
    }

    #[tokio::test]
    async fn test_load_refreshes_stale_cache() {
        let storage = SharedStorage::in_memory();
        let seed = storage.handle(TabId::new());
        let stale_at = now_millis() - 31 * 60 * 1000;
        seed.write(keys::LAST_FETCH, &stale_at);
        seed.write(
            keys::REMOTE_PRODUCTS,
            &vec![remote(1, "electronics").into_product(&CategoryLabels::default())],
        );

        let f = fixture_with(StaticSource::with_ids([1, 2, 3]), storage, BroadcastHub::new());
        assert_eq!(f.catalog.cache_state(), CacheState::Stale);
        let report = f.catalog.load().await;
        assert!(!report.from_cache);
        assert_eq!(f.source.calls(), 1);
        assert_eq!(f.catalog.get_remote().len(), 3);
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_cached_products() {
        let storage = SharedStorage::in_memory();
        let seed = storage.handle(TabId::new());
        let cached: Vec<Product> = (1..=5)
            .map(|id| remote(id, "jewelery").into_product(&CategoryLabels::default()))
            .collect();
        seed.write(keys::REMOTE_PRODUCTS, &cached);
        seed.write(keys::LAST_FETCH, &(now_millis() - 31 * 60 * 1000));

        let f = fixture_with(StaticSource::with_ids([1]), storage, BroadcastHub::new());
        f.catalog.create_local(draft("Anillo", "Joyería")).unwrap();
        f.source.fail(true, true);

        let report = f.catalog.refresh().await;
        assert!(report.from_cache);
        assert!(matches!(report.error, Some(AppError::NetworkFailure(_))));
        assert_eq!(f.catalog.get_all().len(), 6);
        assert_eq!(f.catalog.get_remote(), cached);
        assert!(f.catalog.get_statistics().needs_update);
        assert!(f.catalog.last_error().is_some());
    }

    #[tokio::test]
    async fn test_failed_refresh_with_empty_cache() {
        let f = fixture([1, 2]);
        f.source.fail(true, true);

        let report = f.catalog.refresh().await;
        assert!(report.products.is_empty());
        assert!(report.error.is_some());
        assert_eq!(f.catalog.cache_state(), CacheState::Empty);
        // categories fall back to the built-in list
        assert_eq!(f.catalog.get_categories(), CategoryLabels::fallback_categories());

        f.source.fail(false, false);
        assert!(f.catalog.refresh().await.is_ok());
        assert!(f.catalog.last_error().is_none());
    }

    #[tokio::test]
    async fn test_local_id_floor() {
        let f = fixture([1, 2, 3]);
        f.catalog.refresh().await;

        let first = f.catalog.create_local(draft("Taza", "Hogar")).unwrap();
        assert_eq!(first.id, 1000);
        assert!(first.is_local);
        let second = f.catalog.create_local(draft("Plato", "Hogar")).unwrap();
        assert_eq!(second.id, 1001);

        // zero products at all
        let empty = fixture([]);
        assert_eq!(empty.catalog.create_local(draft("Vaso", "Hogar")).unwrap().id, 1000);
    }

    #[tokio::test]
    async fn test_local_id_above_large_remote_ids() {
        let f = fixture([5, 1500]);
        f.catalog.refresh().await;
        assert_eq!(f.catalog.create_local(draft("Taza", "Hogar")).unwrap().id, 1501);
    }

    #[test]
    fn test_deleted_local_id_not_reissued() {
        let f = fixture([]);
        let a = f.catalog.create_local(draft("Taza", "Hogar")).unwrap();
        f.catalog.delete_local(a.id).unwrap();
        let b = f.catalog.create_local(draft("Plato", "Hogar")).unwrap();
        assert!(b.id > a.id);
    }

    #[tokio::test]
    async fn test_remote_products_are_read_only() {
        let f = fixture([1, 2, 3]);
        f.catalog.refresh().await;
        let before = f.catalog.get_all();

        let patch = ProductPatch {
            name: Some("Editado".to_string()),
            ..Default::default()
        };
        assert_eq!(f.catalog.update_local(2, patch), Err(AppError::NotEditable(2)));
        assert_eq!(f.catalog.delete_local(3), Err(AppError::NotEditable(3)));
        assert_eq!(f.catalog.get_all(), before);
    }

    #[test]
    fn test_update_and_delete_local() {
        let f = fixture([]);
        let created = f.catalog.create_local(draft("Taza", "Hogar")).unwrap();

        let patch = ProductPatch {
            price: Some("$1,250.5".to_string()),
            ..Default::default()
        };
        let updated = f.catalog.update_local(created.id, patch).unwrap();
        assert_eq!(updated.price, "$1250.50");
        assert_eq!(updated.name, "Taza");

        let bad = ProductPatch {
            name: Some("x".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            f.catalog.update_local(created.id, bad),
            Err(AppError::Validation(_))
        ));

        f.catalog.delete_local(created.id).unwrap();
        assert!(f.catalog.get_local().is_empty());
        assert_eq!(
            f.storage.get_raw(keys::LOCAL_PRODUCTS).unwrap().as_deref(),
            Some("[]")
        );
    }

    #[test]
    fn test_invalid_draft_rejected() {
        let f = fixture([]);
        let mut bad = draft("Taza", "Hogar");
        bad.price = "0".to_string();
        assert!(matches!(f.catalog.create_local(bad), Err(AppError::Validation(_))));
        assert!(f.catalog.get_local().is_empty());
    }

    #[test]
    fn test_clear_local() {
        let f = fixture([]);
        assert!(matches!(
            f.catalog.clear_local(),
            Err(AppError::NothingToDelete(_))
        ));
        f.catalog.create_local(draft("Taza", "Hogar")).unwrap();
        f.catalog.create_local(draft("Plato", "Hogar")).unwrap();
        f.catalog.clear_local().unwrap();
        assert!(f.catalog.get_local().is_empty());
    }

    #[tokio::test]
    async fn test_queries() {
        let f = fixture([1, 2, 3, 4]);
        f.catalog.refresh().await;
        f.catalog.create_local(draft("Zapato artesanal", "Calzado")).unwrap();

        let all = f.catalog.get_all();
        assert_eq!(all.len(), 5);
        assert!(!all[0].is_local);
        assert!(all[4].is_local);

        assert_eq!(f.catalog.search("").len(), 5);
        assert_eq!(f.catalog.search("ZAPATO").len(), 1);
        assert_eq!(f.catalog.search("calzado").len(), 1);
        assert_eq!(f.catalog.get_by_category("Calzado").len(), 1);
        assert!(f.catalog.get_categories().contains(&"Calzado".to_string()));
        assert!(f.catalog.get_by_id(999).is_none());

        let stats = f.catalog.get_statistics();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.remote_count, 4);
        assert_eq!(stats.local_count, 1);
        assert_eq!(stats.category_count, 5);
        assert!(!stats.is_stale);
        assert_ne!(stats.last_fetched_display, NEVER_FETCHED);
    }

    #[tokio::test]
    async fn test_filter_and_sort() {
        let f = fixture([1, 2, 3, 4]);
        f.catalog.refresh().await;

        let by_price = f.catalog.filter(&ProductQuery::new().sort_by(SortBy::Price));
        let prices: Vec<_> = by_price.iter().filter_map(|p| p.price_value()).collect();
        let mut sorted = prices.clone();
        sorted.sort();
        assert_eq!(prices, sorted);

        let all = f.catalog.filter(&ProductQuery::new().category(ALL_CATEGORIES));
        assert_eq!(all.len(), 4);

        let jewelry = f
            .catalog
            .filter(&ProductQuery::new().category("Joyería").term("producto"));
        assert_eq!(jewelry.len(), 1);
        assert_eq!(jewelry[0].id, 1);

        let by_category = f.catalog.filter(&ProductQuery::new().sort_by(SortBy::Category));
        assert_eq!(by_category[0].category, "Electrónicos");
    }

    #[test]
    fn test_statistics_never_fetched() {
        let f = fixture([]);
        let stats = f.catalog.get_statistics();
        assert_eq!(stats.last_fetched_display, NEVER_FETCHED);
        assert!(stats.is_stale);
        assert!(stats.needs_update);
    }

    #[tokio::test]
    async fn test_clear_remote_cache() {
        let f = fixture([1, 2]);
        f.catalog.refresh().await;
        f.catalog.create_local(draft("Taza", "Hogar")).unwrap();

        f.catalog.clear_remote_cache();
        assert!(f.catalog.get_remote().is_empty());
        assert_eq!(f.catalog.get_local().len(), 1);
        assert_eq!(f.catalog.cache_state(), CacheState::Empty);
        assert_eq!(f.catalog.get_categories(), vec!["Hogar".to_string()]);

        let store = f.storage.handle(TabId::new());
        assert!(store.read::<Option<i64>>(keys::LAST_FETCH, None).is_none());
    }

    #[tokio::test]
    async fn test_apply_inbound_replaces_memory_only() {
        let f = fixture([]);
        let mut events = f.storage.subscribe();
        let peer = TabId::new();
        let payload = vec![remote(9, "electronics").into_product(&CategoryLabels::default())];

        let envelope = SyncEnvelope::new(peer, 1, SyncMessage::CatalogUpdated { payload: payload.clone() });
        assert!(f.catalog.apply_inbound(&envelope));
        assert_eq!(f.catalog.get_remote(), payload);

        // the sender owns the store write
        let store = f.storage.handle(TabId::new());
        assert!(store.read::<Vec<Product>>(keys::REMOTE_PRODUCTS, vec![]).is_empty());
        assert!(events.try_recv().is_err());

        let favorites = SyncEnvelope::new(peer, 2, SyncMessage::FavoritesUpdated { payload: vec![1] });
        assert!(!f.catalog.apply_inbound(&favorites));
    }

    #[tokio::test]
    async fn test_older_snapshot_restores_winner_in_store() {
        let f = fixture_with_policy(
            StaticSource::with_ids([]),
            SharedStorage::in_memory(),
            BroadcastHub::new(),
            SyncPolicy::LogicalClock,
        );
        let created = f.catalog.create_local(draft("Taza", "Hogar")).unwrap();

        // a peer with an older clock wrote its snapshot after ours
        let peer = TabId::new();
        let loser = vec![{
            let mut p = created.clone();
            p.name = "Plato".to_string();
            p
        }];
        f.storage.handle(peer).write(keys::LOCAL_PRODUCTS, &loser);

        let stale = SyncEnvelope::new(peer, 0, SyncMessage::LocalProductsUpdated { payload: loser });
        assert!(!f.catalog.apply_inbound(&stale));
        assert_eq!(f.catalog.get_local(), vec![created.clone()]);

        let store = f.storage.handle(TabId::new());
        assert_eq!(store.read::<Vec<Product>>(keys::LOCAL_PRODUCTS, vec![]), vec![created]);
    }

    #[tokio::test]
    async fn test_inbound_is_not_rebroadcast() {
        let f = fixture([]);
        let mut rx = f.hub.subscribe(PRODUCTS_CHANNEL).unwrap();
        let envelope = SyncEnvelope::new(
            TabId::new(),
            1,
            SyncMessage::CategoriesUpdated {
                payload: vec!["Joyería".to_string()],
            },
        );
        assert!(f.catalog.apply_inbound(&envelope));
        assert!(rx.try_recv().is_err());

        // a local mutation does broadcast
        f.catalog.create_local(draft("Taza", "Hogar")).unwrap();
        let sent = rx.try_recv().unwrap();
        assert!(matches!(sent.message, SyncMessage::LocalProductsUpdated { .. }));
    }
}
