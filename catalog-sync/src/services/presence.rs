//! Presence Tracker - 标签页心跳
//!
//! Every tab pings on `tab-count` at a fixed interval. Peers are tracked by
//! origin id with the timestamp of their latest ping; peers silent for longer
//! than the TTL are evicted. Nothing here is persisted.

use parking_lot::Mutex;
use serde::Serialize;
use shared::message::{PRESENCE_CHANNEL, SyncEnvelope, SyncMessage, TabId};
use shared::util::now_millis;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

use crate::message::{BroadcastHub, LamportClock, SyncChannel};

const MIN_PING_INTERVAL: Duration = Duration::from_millis(1);

/// Heartbeat timing
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Ping period (default: 5s)
    pub ping_interval: Duration,
    /// Peers silent for longer are dropped (default: 10s)
    pub peer_ttl: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(5),
            peer_ttl: Duration::from_secs(10),
        }
    }
}

/// Coarse sync indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Connected,
    Offline,
}

/// Snapshot published to subscribers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceStatus {
    /// Live peers plus this tab
    pub tabs_connected: usize,
    pub is_online: bool,
    pub sync_status: SyncStatus,
    /// Millis of the last ping received from a peer
    pub last_sync: Option<i64>,
}

impl Default for PresenceStatus {
    fn default() -> Self {
        Self {
            tabs_connected: 1,
            is_online: true,
            sync_status: SyncStatus::Connected,
            last_sync: None,
        }
    }
}

/// Peer bookkeeping: origin -> last ping timestamp
#[derive(Debug, Default)]
struct Peers {
    seen: HashMap<TabId, i64>,
}

impl Peers {
    fn observe(&mut self, origin: TabId, timestamp: i64) {
        self.seen.insert(origin, timestamp);
    }

    /// Drop peers whose last ping is older than `ttl_ms`
    fn evict(&mut self, now: i64, ttl_ms: i64) -> usize {
        let before = self.seen.len();
        self.seen.retain(|_, at| now - *at <= ttl_ms);
        before - self.seen.len()
    }

    fn remove(&mut self, origin: &TabId) {
        self.seen.remove(origin);
    }
}

/// Per-tab presence tracker
///
/// Must be started inside a tokio runtime. Dropping it stops the heartbeat.
pub struct PresenceTracker {
    origin: TabId,
    channel: Arc<SyncChannel>,
    peers: Arc<Mutex<Peers>>,
    status_tx: Arc<watch::Sender<PresenceStatus>>,
    shutdown: CancellationToken,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for PresenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceTracker")
            .field("origin", &self.origin)
            .field("status", &*self.status_tx.borrow())
            .finish()
    }
}

impl PresenceTracker {
    /// Open the presence channel and start pinging
    pub fn start(hub: &BroadcastHub, origin: TabId, config: PresenceConfig) -> Self {
        let channel = Arc::new(SyncChannel::open(
            PRESENCE_CHANNEL,
            origin,
            hub,
            None,
            Arc::new(LamportClock::new()),
        ));
        let peers = Arc::new(Mutex::new(Peers::default()));
        let status_tx = Arc::new(watch::channel(PresenceStatus::default()).0);
        let ttl_ms = config.peer_ttl.as_millis() as i64;

        {
            let peers = peers.clone();
            let status_tx = status_tx.clone();
            channel.on_message(move |envelope| observe_ping(&peers, &status_tx, &envelope, ttl_ms));
        }

        let shutdown = CancellationToken::new();
        let ticker = tokio::spawn(run_heartbeat(
            channel.clone(),
            peers.clone(),
            status_tx.clone(),
            config.ping_interval,
            ttl_ms,
            shutdown.clone(),
        ));
        tracing::debug!(tab = %origin, native = hub.is_native(), "Presence tracker started");

        Self {
            origin,
            channel,
            peers,
            status_tx,
            shutdown,
            ticker: Mutex::new(Some(ticker)),
        }
    }

    pub fn origin(&self) -> TabId {
        self.origin
    }

    pub fn status(&self) -> PresenceStatus {
        self.status_tx.borrow().clone()
    }

    pub fn tabs_connected(&self) -> usize {
        self.status_tx.borrow().tabs_connected
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<PresenceStatus> {
        self.status_tx.subscribe()
    }

    /// Connectivity transition (online/offline event)
    pub fn set_online(&self, online: bool) {
        self.status_tx.send_if_modified(|status| {
            if status.is_online == online {
                return false;
            }
            status.is_online = online;
            status.sync_status = if online {
                SyncStatus::Connected
            } else {
                SyncStatus::Offline
            };
            true
        });
        if online {
            tracing::info!(tab = %self.origin, "Back online");
        } else {
            tracing::warn!(tab = %self.origin, "Connection lost, working offline");
        }
    }

    /// Stop pinging and release the channel; idempotent
    pub fn stop(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.ticker.lock().take() {
            handle.abort();
        }
        self.channel.close();
        self.peers.lock().seen.clear();
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_heartbeat(
    channel: Arc<SyncChannel>,
    peers: Arc<Mutex<Peers>>,
    status_tx: Arc<watch::Sender<PresenceStatus>>,
    period: Duration,
    ttl_ms: i64,
    shutdown: CancellationToken,
) {
    let mut ticker = interval(period.max(MIN_PING_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let now = now_millis();
                channel.send(SyncMessage::PresencePing { timestamp: now });
                // a tab that closed without a goodbye stops pinging; drop it
                // even when no other ping arrives to trigger eviction
                let live = {
                    let mut peers = peers.lock();
                    peers.evict(now, ttl_ms);
                    peers.seen.len()
                };
                publish_count(&status_tx, live, None);
            }
        }
    }
}

fn observe_ping(
    peers: &Mutex<Peers>,
    status_tx: &watch::Sender<PresenceStatus>,
    envelope: &SyncEnvelope,
    ttl_ms: i64,
) {
    let SyncMessage::PresencePing { timestamp } = envelope.message else {
        return;
    };
    let now = now_millis();
    let live = {
        let mut peers = peers.lock();
        if now - timestamp > ttl_ms {
            // already expired on arrival
            peers.remove(&envelope.origin);
        } else {
            peers.observe(envelope.origin, timestamp);
        }
        let evicted = peers.evict(now, ttl_ms);
        if evicted > 0 {
            tracing::debug!(evicted, "Silent tabs evicted");
        }
        peers.seen.len()
    };
    publish_count(status_tx, live, Some(now));
}

fn publish_count(status_tx: &watch::Sender<PresenceStatus>, peers: usize, synced_at: Option<i64>) {
    status_tx.send_if_modified(|status| {
        let tabs = peers + 1;
        let mut changed = false;
        if status.tabs_connected != tabs {
            status.tabs_connected = tabs;
            changed = true;
        }
        if synced_at.is_some() && status.last_sync != synced_at {
            status.last_sync = synced_at;
            changed = true;
        }
        changed
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> PresenceConfig {
        PresenceConfig {
            ping_interval: Duration::from_millis(40),
            peer_ttl: Duration::from_millis(200),
        }
    }

    async fn wait_for_tabs(tracker: &PresenceTracker, expected: usize) -> bool {
        let mut rx = tracker.subscribe();
        let wait = async {
            loop {
                if rx.borrow_and_update().tabs_connected == expected {
                    return;
                }
                if rx.changed().await.is_err() {
                    return;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(2), wait).await.is_ok()
            && tracker.tabs_connected() == expected
    }

    #[test]
    fn test_peer_eviction() {
        let mut peers = Peers::default();
        let a = TabId::new();
        let b = TabId::new();
        peers.observe(a, 1_000);
        peers.observe(b, 9_000);
        assert_eq!(peers.evict(11_500, 10_000), 1);
        assert!(peers.seen.contains_key(&b));

        // re-pinging refreshes instead of adding
        peers.observe(b, 12_000);
        assert_eq!(peers.seen.len(), 1);
    }

    #[tokio::test]
    async fn test_alone_reports_one_tab() {
        let hub = BroadcastHub::new();
        let tracker = PresenceTracker::start(&hub, TabId::new(), fast());
        tokio::time::sleep(Duration::from_millis(100)).await;

        let status = tracker.status();
        assert_eq!(status.tabs_connected, 1);
        assert!(status.is_online);
        assert_eq!(status.sync_status, SyncStatus::Connected);
    }

    #[tokio::test]
    async fn test_zero_ping_interval_still_pings() {
        let hub = BroadcastHub::new();
        let zero = PresenceConfig {
            ping_interval: Duration::ZERO,
            peer_ttl: Duration::from_millis(200),
        };
        let a = PresenceTracker::start(&hub, TabId::new(), zero.clone());
        let b = PresenceTracker::start(&hub, TabId::new(), zero);

        assert!(wait_for_tabs(&a, 2).await);
        assert!(wait_for_tabs(&b, 2).await);
    }

    #[tokio::test]
    async fn test_two_tabs_see_each_other_then_expire() {
        let hub = BroadcastHub::new();
        let a = PresenceTracker::start(&hub, TabId::new(), fast());
        let b = PresenceTracker::start(&hub, TabId::new(), fast());

        assert!(wait_for_tabs(&a, 2).await);
        assert!(wait_for_tabs(&b, 2).await);
        assert!(a.status().last_sync.is_some());

        b.stop();
        assert!(wait_for_tabs(&a, 1).await);
    }

    #[tokio::test]
    async fn test_online_transitions() {
        let hub = BroadcastHub::new();
        let tracker = PresenceTracker::start(&hub, TabId::new(), fast());
        let mut rx = tracker.subscribe();

        tracker.set_online(false);
        assert!(rx.has_changed().unwrap());
        let status = rx.borrow_and_update().clone();
        assert!(!status.is_online);
        assert_eq!(status.sync_status, SyncStatus::Offline);

        tracker.set_online(true);
        assert_eq!(tracker.status().sync_status, SyncStatus::Connected);
    }

    #[tokio::test]
    async fn test_unsupported_hub_counts_only_self() {
        let hub = BroadcastHub::unsupported();
        let a = PresenceTracker::start(&hub, TabId::new(), fast());
        let _b = PresenceTracker::start(&hub, TabId::new(), fast());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(a.tabs_connected(), 1);
    }

    #[tokio::test]
    async fn test_stop_releases_channel() {
        let hub = BroadcastHub::new();
        let tracker = PresenceTracker::start(&hub, TabId::new(), fast());
        assert_eq!(hub.receiver_count(PRESENCE_CHANNEL), 1);
        tracker.stop();
        tracker.stop();

        let released = async {
            while hub.receiver_count(PRESENCE_CHANNEL) > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        assert!(tokio::time::timeout(Duration::from_secs(1), released).await.is_ok());
    }
}
