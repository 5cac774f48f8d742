//! 跨标签页广播
//!
//! # 架构
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    BroadcastHub                      │
//! │   "productos-sync" ─▶ broadcast::Sender<SyncEnvelope>│
//! │   "favoritos-sync" ─▶ broadcast::Sender<SyncEnvelope>│
//! │   "tab-count"      ─▶ broadcast::Sender<SyncEnvelope>│
//! └────────────────────────┬─────────────────────────────┘
//!                          │ native
//!              ┌───────────▼───────────┐
//!              │      SyncChannel      │──▶ on_message(callback)
//!              └───────────▲───────────┘
//!                          │ fallback (hub unsupported)
//!              ┌───────────┴───────────┐
//!              │ SharedStorage events  │
//!              └───────────────────────┘
//! ```
//!
//! Both paths hand the same `SyncEnvelope` to the callback. A tab never
//! receives what it sent itself: envelopes (and storage events) carry the
//! sender's `TabId` and are filtered on arrival.

pub mod channel;
pub mod clock;
pub mod hub;

pub use channel::SyncChannel;
pub use clock::{LamportClock, SyncGate, SyncPolicy};
pub use hub::{BroadcastHub, HubConfig};
