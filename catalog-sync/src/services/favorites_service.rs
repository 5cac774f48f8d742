//! Favorites Service - bounded, persisted set of product ids
//!
//! Membership keeps insertion order so `list` is stable. The bound is checked
//! at insertion; a full set rejects new ids without error (observable via
//! `is_at_limit`).

use parking_lot::RwLock;
use shared::message::{Collection, SyncEnvelope, SyncMessage, keys};
use shared::models::{FavoritesExport, ProductId};
use shared::util::now_rfc3339;
use std::collections::HashSet;
use std::sync::Arc;

use crate::common::logger::SYNC_TARGET;
use crate::common::{AppError, AppResult};
use crate::message::{SyncChannel, SyncGate};
use crate::storage::LocalStore;

pub const DEFAULT_MAX_FAVORITES: usize = 50;

/// Per-tab favorites set
#[derive(Clone)]
pub struct FavoritesService {
    store: LocalStore,
    channel: Arc<SyncChannel>,
    gate: Arc<SyncGate>,
    max: usize,
    items: Arc<RwLock<Vec<ProductId>>>,
}

impl std::fmt::Debug for FavoritesService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoritesService")
            .field("count", &self.count())
            .field("max", &self.max)
            .finish()
    }
}

impl FavoritesService {
    /// Create the service, hydrating from the persisted store
    ///
    /// A persisted list longer than `max` is clipped in memory.
    pub fn new(
        store: LocalStore,
        channel: Arc<SyncChannel>,
        gate: Arc<SyncGate>,
        max: usize,
    ) -> Self {
        let persisted: Vec<ProductId> = store.read(keys::FAVORITES, Vec::new());
        let items = normalize(persisted, max);
        Self {
            store,
            channel,
            gate,
            max,
            items: Arc::new(RwLock::new(items)),
        }
    }

    // ========== Queries ==========

    pub fn is_favorite(&self, id: ProductId) -> bool {
        self.items.read().contains(&id)
    }

    pub fn list(&self) -> Vec<ProductId> {
        self.items.read().clone()
    }

    pub fn count(&self) -> usize {
        self.items.read().len()
    }

    pub fn max(&self) -> usize {
        self.max
    }

    pub fn is_at_limit(&self) -> bool {
        self.count() >= self.max
    }

    // ========== Mutations ==========

    /// Flip membership; returns whether `id` is a favorite afterwards
    ///
    /// Adding to a full set is a silent no-op.
    pub fn toggle(&self, id: ProductId) -> bool {
        let mut items = self.items.write();
        if let Some(index) = items.iter().position(|x| *x == id) {
            items.remove(index);
            self.commit(&items);
            return false;
        }
        if items.len() >= self.max {
            tracing::debug!(id, max = self.max, "Favorites full, toggle ignored");
            return false;
        }
        items.push(id);
        self.commit(&items);
        true
    }

    /// Add `id`; `Ok(false)` when already present
    pub fn add(&self, id: ProductId) -> AppResult<bool> {
        let mut items = self.items.write();
        if items.contains(&id) {
            return Ok(false);
        }
        if items.len() >= self.max {
            return Err(AppError::CapacityExceeded(self.max));
        }
        items.push(id);
        self.commit(&items);
        Ok(true)
    }

    /// Add ids in order until the set is full; returns how many were added
    pub fn add_many(&self, ids: impl IntoIterator<Item = ProductId>) -> usize {
        let mut items = self.items.write();
        let mut added = 0;
        for id in ids {
            if items.len() >= self.max {
                break;
            }
            if !items.contains(&id) {
                items.push(id);
                added += 1;
            }
        }
        if added > 0 {
            self.commit(&items);
        }
        added
    }

    /// Returns whether `id` was present
    pub fn remove(&self, id: ProductId) -> bool {
        let mut items = self.items.write();
        let before = items.len();
        items.retain(|x| *x != id);
        if items.len() == before {
            return false;
        }
        self.commit(&items);
        true
    }

    /// Empty the set unconditionally
    pub fn clear(&self) {
        let mut items = self.items.write();
        let removed = items.len();
        items.clear();
        self.commit(&items);
        tracing::info!(removed, "Favorites cleared");
    }

    /// Clear after asking `confirm` when required
    ///
    /// `confirm` is only called when `require` is set and the set is not
    /// empty. Returns false when the caller declined.
    pub fn clear_with_confirmation(&self, require: bool, confirm: impl FnOnce() -> bool) -> bool {
        if require && self.count() > 0 && !confirm() {
            return false;
        }
        self.clear();
        true
    }

    // ========== Export / import ==========

    /// `{ favorites, count, exportedAt }` as pretty JSON
    pub fn export_snapshot(&self) -> AppResult<String> {
        let export = FavoritesExport::new(self.list(), now_rfc3339());
        serde_json::to_string_pretty(&export).map_err(|e| AppError::internal(e.to_string()))
    }

    /// Replace the set from an exported snapshot; false on any malformed input
    pub fn import_snapshot(&self, text: &str) -> bool {
        match self.try_import(text) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Favorites import rejected");
                false
            }
        }
    }

    /// Like `import_snapshot`, reporting the failure; returns the new count
    ///
    /// Duplicates collapse to their first occurrence, then the list is
    /// clipped to the bound.
    pub fn try_import(&self, text: &str) -> AppResult<usize> {
        let export: FavoritesExport =
            serde_json::from_str(text).map_err(|e| AppError::malformed(e.to_string()))?;
        export.validate().map_err(AppError::malformed)?;

        let imported = normalize(export.favorites, self.max);
        let count = imported.len();
        let mut items = self.items.write();
        *items = imported;
        self.commit(&items);
        tracing::info!(count, "Favorites imported");
        Ok(count)
    }

    // ========== Cross-tab sync ==========

    /// Persist and broadcast the full set
    fn commit(&self, items: &[ProductId]) {
        self.store.write(keys::FAVORITES, items);
        let message = SyncMessage::FavoritesUpdated {
            payload: items.to_vec(),
        };
        if let Some(clock) = self.channel.send(message) {
            self.gate
                .record_local(Collection::Favorites, clock, self.store.origin());
        }
    }

    /// Apply a peer's snapshot: replace in memory only
    ///
    /// The sending tab already persisted it, and nothing is rebroadcast.
    /// A dropped older snapshot is still in the store, so the winning set
    /// is written back over it.
    pub fn apply_inbound(&self, envelope: &SyncEnvelope) -> bool {
        let SyncMessage::FavoritesUpdated { payload } = &envelope.message else {
            return false;
        };
        if !self.gate.admit(Collection::Favorites, envelope) {
            tracing::debug!(target: SYNC_TARGET, from = %envelope.origin, clock = envelope.clock, "Older favorites snapshot dropped");
            let items = self.items.read();
            self.store.write(keys::FAVORITES, &*items);
            return false;
        }
        *self.items.write() = normalize(payload.clone(), self.max);
        tracing::debug!(
            target: SYNC_TARGET,
            from = %envelope.origin,
            count = payload.len(),
            "Inbound favorites applied"
        );
        true
    }
}

/// Dedupe keeping first occurrences, then clip to `max`
fn normalize(ids: Vec<ProductId>, max: usize) -> Vec<ProductId> {
    let mut seen = HashSet::new();
    ids.into_iter()
        .filter(|id| seen.insert(*id))
        .take(max)
        .collect()
}
