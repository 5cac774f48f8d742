//! Persistent key-value storage
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐
//! │ LocalStore   │   │ LocalStore   │   one handle per tab (origin-tagged)
//! │  (tab A)     │   │  (tab B)     │
//! └──────┬───────┘   └──────┬───────┘
//!        └────────┬─────────┘
//!          ┌──────▼────────┐
//!          │ SharedStorage │──▶ StorageEvent broadcast (other tabs only)
//!          └──────┬────────┘
//!          ┌──────▼────────┐
//!          │StorageBackend │   redb file | memory
//!          └───────────────┘
//! ```
//!
//! Values are JSON text. The typed `LocalStore` API never fails: errors are
//! logged and degrade to the caller-supplied default.

pub mod backend;
pub mod local_store;
pub mod redb_backend;

pub use backend::{MemoryBackend, StorageBackend};
pub use local_store::{LocalStore, SharedStorage, StorageEvent};
pub use redb_backend::RedbBackend;

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Quota exceeded: {used} of {quota} bytes")]
    QuotaExceeded { used: usize, quota: usize },

    #[error("Storage disabled")]
    Disabled,
}

pub type StorageResult<T> = Result<T, StorageError>;
