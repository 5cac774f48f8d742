//! Process-wide registry of named broadcast channels

use dashmap::DashMap;
use shared::message::SyncEnvelope;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Hub configuration
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Capacity of each named channel (default: 256)
    pub channel_capacity: usize,
    /// Whether the native broadcast primitive is available
    pub native: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
            native: true,
        }
    }
}

/// 广播中心 - shared by every tab of one origin
///
/// Channels are created lazily on first use and live as long as the hub.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    /// Channel name -> sender
    channels: Arc<DashMap<String, broadcast::Sender<SyncEnvelope>>>,
    config: HubConfig,
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::from_config(HubConfig::default())
    }

    pub fn from_config(config: HubConfig) -> Self {
        Self {
            channels: Arc::new(DashMap::new()),
            config,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_config(HubConfig {
            channel_capacity: capacity,
            ..Default::default()
        })
    }

    /// A hub for a runtime without the native primitive
    ///
    /// Channels opened against it fall back to storage events.
    pub fn unsupported() -> Self {
        Self::from_config(HubConfig {
            native: false,
            ..Default::default()
        })
    }

    pub fn is_native(&self) -> bool {
        self.config.native
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    fn sender(&self, name: &str) -> broadcast::Sender<SyncEnvelope> {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| broadcast::channel(self.config.channel_capacity).0)
            .clone()
    }

    /// Subscribe to a named channel; `None` when the primitive is unavailable
    pub fn subscribe(&self, name: &str) -> Option<broadcast::Receiver<SyncEnvelope>> {
        if !self.config.native {
            return None;
        }
        Some(self.sender(name).subscribe())
    }

    /// Publish to every receiver of `name`; returns how many got it
    pub fn publish(&self, name: &str, envelope: SyncEnvelope) -> usize {
        if !self.config.native {
            return 0;
        }
        // No receivers is not an error: the tab may be alone
        self.sender(name).send(envelope).unwrap_or(0)
    }

    /// Live receivers on a channel
    pub fn receiver_count(&self, name: &str) -> usize {
        self.channels
            .get(name)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    /// Names of channels created so far
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}
