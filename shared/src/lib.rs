//! Shared types for the catalog sync workspace
//!
//! Domain models, the cross-tab wire protocol and small utilities used by
//! the sync services and by anything composing them (UI shells, CLIs, tests).

pub mod message;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

pub use message::{Collection, SyncEnvelope, SyncMessage, TabId};
pub use models::{
    CategoryLabels, DraftError, FavoritesExport, Product, ProductDraft, ProductId, ProductPatch,
    Rating, RemoteProduct,
};
