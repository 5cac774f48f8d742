//! Named cross-tab channel handle

use parking_lot::Mutex;
use shared::message::{
    Collection, FAVORITES_CHANNEL, PRESENCE_CHANNEL, PRODUCTS_CHANNEL, SyncEnvelope, SyncMessage,
    TabId,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{BroadcastHub, LamportClock};
use crate::common::logger::SYNC_TARGET;
use crate::storage::{SharedStorage, StorageEvent};

/// Which inbound source a channel listens to
enum Source {
    Native(broadcast::Receiver<SyncEnvelope>),
    Storage(broadcast::Receiver<StorageEvent>),
    /// Neither transport available: the channel is send-only and silent
    None,
}

/// 同步通道
///
/// `send` publishes to every other tab on the same channel name. In fallback
/// mode `send` is a no-op: the state change reaches peers through the
/// storage write the service performs anyway.
///
/// Dropping the handle closes it.
pub struct SyncChannel {
    name: String,
    origin: TabId,
    hub: BroadcastHub,
    storage: Option<SharedStorage>,
    clock: Arc<LamportClock>,
    /// Subscription taken at open time, handed to the first listener
    pending: Mutex<Option<Source>>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl std::fmt::Debug for SyncChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncChannel")
            .field("name", &self.name)
            .field("origin", &self.origin)
            .field("native", &self.hub.is_native())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SyncChannel {
    /// Open a channel for `origin`
    ///
    /// `storage` is only used when the hub has no native primitive.
    pub fn open(
        name: impl Into<String>,
        origin: TabId,
        hub: &BroadcastHub,
        storage: Option<&SharedStorage>,
        clock: Arc<LamportClock>,
    ) -> Self {
        let name = name.into();
        let storage = storage.cloned();
        let source = Self::subscribe(&name, hub, storage.as_ref());
        if matches!(source, Source::Storage(_)) {
            tracing::debug!(channel = %name, tab = %origin, "Broadcast unavailable, using storage events");
        }
        Self {
            name,
            origin,
            hub: hub.clone(),
            storage,
            clock,
            pending: Mutex::new(Some(source)),
            listeners: Mutex::new(Vec::new()),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn subscribe(name: &str, hub: &BroadcastHub, storage: Option<&SharedStorage>) -> Source {
        if let Some(rx) = hub.subscribe(name) {
            return Source::Native(rx);
        }
        match storage {
            Some(storage) => Source::Storage(storage.subscribe()),
            None => Source::None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> TabId {
        self.origin
    }

    pub fn is_native(&self) -> bool {
        self.hub.is_native()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a message to the other tabs
    ///
    /// Returns the Lamport stamp assigned to the change, or `None` once the
    /// channel is closed.
    pub fn send(&self, message: SyncMessage) -> Option<u64> {
        if self.is_closed() {
            tracing::debug!(channel = %self.name, kind = message.kind(), "Send on closed channel ignored");
            return None;
        }
        let clock = self.clock.tick();
        if self.hub.is_native() {
            let kind = message.kind();
            let delivered = self
                .hub
                .publish(&self.name, SyncEnvelope::new(self.origin, clock, message));
            tracing::debug!(target: SYNC_TARGET, channel = %self.name, kind, clock, delivered, "Broadcast sent");
        }
        Some(clock)
    }

    /// Register a callback for messages from other tabs
    ///
    /// The callback runs on a background task until the channel is closed.
    /// Messages arriving between `open` and the first `on_message` call are
    /// buffered (up to the hub capacity).
    pub fn on_message<F>(&self, callback: F)
    where
        F: Fn(SyncEnvelope) + Send + Sync + 'static,
    {
        if self.is_closed() {
            return;
        }
        let source = self
            .pending
            .lock()
            .take()
            .unwrap_or_else(|| Self::subscribe(&self.name, &self.hub, self.storage.as_ref()));

        let listener = Listener {
            name: self.name.clone(),
            origin: self.origin,
            clock: self.clock.clone(),
            shutdown: self.shutdown.clone(),
        };
        let handle = match source {
            Source::Native(rx) => tokio::spawn(listener.run_native(rx, callback)),
            Source::Storage(rx) => tokio::spawn(listener.run_storage(rx, callback)),
            Source::None => return,
        };
        self.listeners.lock().push(handle);
    }

    /// Release the subscription
    ///
    /// Idempotent. Listener tasks exit at their next poll.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.cancel();
        self.pending.lock().take();
        for handle in self.listeners.lock().drain(..) {
            handle.abort();
        }
        tracing::debug!(channel = %self.name, tab = %self.origin, "Channel closed");
    }
}

impl Drop for SyncChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// State moved into a listener task
struct Listener {
    name: String,
    origin: TabId,
    clock: Arc<LamportClock>,
    shutdown: CancellationToken,
}

impl Listener {
    async fn run_native<F>(self, mut rx: broadcast::Receiver<SyncEnvelope>, callback: F)
    where
        F: Fn(SyncEnvelope) + Send + Sync + 'static,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = rx.recv() => match result {
                    Ok(envelope) => {
                        if envelope.is_from(self.origin) {
                            continue;
                        }
                        self.clock.observe(envelope.clock);
                        callback(envelope);
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(channel = %self.name, skipped = n, "Listener lagged, messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    async fn run_storage<F>(self, mut rx: broadcast::Receiver<StorageEvent>, callback: F)
    where
        F: Fn(SyncEnvelope) + Send + Sync + 'static,
    {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = rx.recv() => match result {
                    Ok(event) => {
                        if let Some(envelope) = self.synthesize(event) {
                            callback(envelope);
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        tracing::warn!(channel = %self.name, skipped = n, "Storage listener lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    /// Turn another tab's storage write into an envelope for this channel
    fn synthesize(&self, event: StorageEvent) -> Option<SyncEnvelope> {
        if event.origin == self.origin {
            return None;
        }
        let wanted = match channel_for_key(&event.key) {
            Some(channel) => channel == self.name,
            // presence never persists anything
            None => self.name != PRESENCE_CHANNEL,
        };
        if !wanted {
            return None;
        }
        let data = match event.new_value.as_deref() {
            Some(raw) => match serde_json::from_str(raw) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(key = %event.key, error = %e, "Unparsable storage value ignored");
                    return None;
                }
            },
            None => serde_json::Value::Null,
        };
        // No clock travels with a storage event: stamp it as a fresh local
        // event so it resolves by arrival order under either policy.
        let clock = self.clock.tick();
        Some(SyncEnvelope::new(
            event.origin,
            clock,
            SyncMessage::from_storage(&event.key, data),
        ))
    }
}

/// Channel that carries the collection stored under `key`
fn channel_for_key(key: &str) -> Option<&'static str> {
    match Collection::from_storage_key(key)? {
        Collection::Favorites => Some(FAVORITES_CHANNEL),
        Collection::RemoteProducts | Collection::LocalProducts | Collection::Categories => {
            Some(PRODUCTS_CHANNEL)
        }
    }
}
