//! Logical clocks and inbound ordering policy
//!
//! Arrival order is the default: the last message processed wins, which can
//! silently drop one of two near-simultaneous changes. `LogicalClock` orders
//! changes per collection by `(clock, origin)` instead, so every tab converges
//! on the same winner regardless of delivery order.

use dashmap::DashMap;
use shared::message::{Collection, SyncEnvelope, TabId};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-tab Lamport counter
#[derive(Debug, Default)]
pub struct LamportClock {
    counter: AtomicU64,
}

impl LamportClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance for a local event and return the new value
    pub fn tick(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Merge a remote timestamp: local = max(local, remote) + 1
    pub fn observe(&self, remote: u64) -> u64 {
        self.counter.fetch_max(remote, Ordering::SeqCst);
        self.tick()
    }

    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// Conflict resolution for inbound snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Last processed message wins
    #[default]
    ArrivalOrder,
    /// Highest `(clock, origin)` wins; older snapshots are dropped
    LogicalClock,
}

impl FromStr for SyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "arrival" | "arrival-order" => Ok(SyncPolicy::ArrivalOrder),
            "logical-clock" | "lamport" => Ok(SyncPolicy::LogicalClock),
            other => Err(format!("unknown sync policy: {other}")),
        }
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPolicy::ArrivalOrder => write!(f, "arrival"),
            SyncPolicy::LogicalClock => write!(f, "logical-clock"),
        }
    }
}

/// Decides whether an inbound snapshot may replace local state
///
/// Keeps the stamp of the last accepted change per collection, local or
/// remote.
#[derive(Debug, Default)]
pub struct SyncGate {
    policy: SyncPolicy,
    versions: DashMap<Collection, (u64, TabId)>,
}

impl SyncGate {
    pub fn new(policy: SyncPolicy) -> Self {
        Self {
            policy,
            versions: DashMap::new(),
        }
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// Record a change made by this tab
    pub fn record_local(&self, collection: Collection, clock: u64, origin: TabId) {
        self.bump(collection, (clock, origin));
    }

    /// Check (and record) an inbound envelope for `collection`
    pub fn admit(&self, collection: Collection, envelope: &SyncEnvelope) -> bool {
        let stamp = (envelope.clock, envelope.origin);
        match self.policy {
            SyncPolicy::ArrivalOrder => {
                self.versions.insert(collection, stamp);
                true
            }
            SyncPolicy::LogicalClock => self.bump(collection, stamp),
        }
    }

    /// Stamp of the last accepted change
    pub fn version(&self, collection: Collection) -> Option<(u64, TabId)> {
        self.versions.get(&collection).map(|v| *v)
    }

    fn bump(&self, collection: Collection, stamp: (u64, TabId)) -> bool {
        let mut entry = self.versions.entry(collection).or_insert(stamp);
        if stamp >= *entry {
            *entry = stamp;
            true
        } else {
            false
        }
    }
}
