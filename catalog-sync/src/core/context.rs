//! Composition root
//!
//! `Origin` holds what every tab of one origin shares (store, broadcast hub,
//! upstream source). `TabContext` is one tab: its own services, wired to the
//! shared pieces through constructor injection.

use std::sync::Arc;

use shared::message::{FAVORITES_CHANNEL, PRODUCTS_CHANNEL, TabId};

use super::{Config, StorageKind};
use crate::common::AppResult;
use crate::message::{BroadcastHub, LamportClock, SyncChannel, SyncGate};
use crate::services::{CatalogService, FavoritesService, PresenceTracker};
use crate::storage::{LocalStore, SharedStorage};
use crate::upstream::{HttpProductSource, ProductSource};

/// Shared by every tab of an origin
///
/// Clones are shallow.
#[derive(Clone)]
pub struct Origin {
    pub config: Config,
    pub hub: BroadcastHub,
    pub storage: SharedStorage,
    pub source: Arc<dyn ProductSource>,
}

impl std::fmt::Debug for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Origin")
            .field("hub", &self.hub)
            .field("storage", &self.storage)
            .finish()
    }
}

impl Origin {
    /// Build the store, hub and HTTP source described by `config`
    pub fn initialize(config: &Config) -> AppResult<Self> {
        let storage = match config.storage_backend {
            StorageKind::Redb => {
                std::fs::create_dir_all(&config.work_dir).map_err(|e| {
                    crate::common::AppError::storage(format!(
                        "cannot create work dir {}: {e}",
                        config.work_dir
                    ))
                })?;
                SharedStorage::open_redb(config.store_path())?
            }
            StorageKind::Memory => SharedStorage::in_memory(),
        };
        let source = HttpProductSource::new(&config.api_base_url, config.request_timeout())?;
        tracing::info!(
            api = %config.api_base_url,
            storage = ?config.storage_backend,
            native = config.broadcast_native,
            policy = %config.sync_policy,
            "Origin initialized"
        );
        Ok(Self::with_parts(
            config.clone(),
            BroadcastHub::from_config(config.hub_config()),
            storage,
            Arc::new(source),
        ))
    }

    pub fn with_parts(
        config: Config,
        hub: BroadcastHub,
        storage: SharedStorage,
        source: Arc<dyn ProductSource>,
    ) -> Self {
        Self {
            config,
            hub,
            storage,
            source,
        }
    }

    /// Open a new tab against this origin
    pub fn open_tab(&self) -> TabContext {
        TabContext::open(&self.config, &self.hub, &self.storage, self.source.clone())
    }
}

/// One tab: services plus the channel subscriptions feeding them
///
/// Must be opened inside a tokio runtime. Dropping it closes every
/// subscription.
pub struct TabContext {
    origin: TabId,
    store: LocalStore,
    gate: Arc<SyncGate>,
    products_channel: Arc<SyncChannel>,
    favorites_channel: Arc<SyncChannel>,
    catalog: CatalogService,
    favorites: FavoritesService,
    presence: PresenceTracker,
}

impl std::fmt::Debug for TabContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TabContext")
            .field("origin", &self.origin)
            .field("catalog", &self.catalog)
            .field("favorites", &self.favorites)
            .field("presence", &self.presence)
            .finish()
    }
}

impl TabContext {
    pub fn open(
        config: &Config,
        hub: &BroadcastHub,
        storage: &SharedStorage,
        source: Arc<dyn ProductSource>,
    ) -> Self {
        let origin = TabId::new();
        let store = storage.handle(origin);
        let clock = Arc::new(LamportClock::new());
        let gate = Arc::new(SyncGate::new(config.sync_policy));

        let products_channel = Arc::new(SyncChannel::open(
            PRODUCTS_CHANNEL,
            origin,
            hub,
            Some(storage),
            clock.clone(),
        ));
        let favorites_channel = Arc::new(SyncChannel::open(
            FAVORITES_CHANNEL,
            origin,
            hub,
            Some(storage),
            clock,
        ));

        let catalog = CatalogService::new(
            store.clone(),
            products_channel.clone(),
            gate.clone(),
            source,
            config.catalog_config(),
        );
        let favorites = FavoritesService::new(
            store.clone(),
            favorites_channel.clone(),
            gate.clone(),
            config.max_favorites,
        );

        {
            let catalog = catalog.clone();
            products_channel.on_message(move |envelope| {
                catalog.apply_inbound(&envelope);
            });
        }
        {
            let favorites = favorites.clone();
            favorites_channel.on_message(move |envelope| {
                favorites.apply_inbound(&envelope);
            });
        }

        let presence = PresenceTracker::start(hub, origin, config.presence_config());
        tracing::info!(tab = %origin, "Tab opened");

        Self {
            origin,
            store,
            gate,
            products_channel,
            favorites_channel,
            catalog,
            favorites,
            presence,
        }
    }

    pub fn origin(&self) -> TabId {
        self.origin
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn gate(&self) -> &SyncGate {
        &self.gate
    }

    pub fn catalog(&self) -> &CatalogService {
        &self.catalog
    }

    pub fn favorites(&self) -> &FavoritesService {
        &self.favorites
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn is_closed(&self) -> bool {
        self.products_channel.is_closed() && self.favorites_channel.is_closed()
    }

    /// Release every subscription; idempotent
    pub fn close(&self) {
        if self.is_closed() {
            return;
        }
        self.products_channel.close();
        self.favorites_channel.close();
        self.presence.stop();
        tracing::info!(tab = %self.origin, "Tab closed");
    }
}

impl Drop for TabContext {
    fn drop(&mut self) {
        self.close();
    }
}
