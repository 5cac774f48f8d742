//! Unified Error Handling
//!
//! Two kinds of failure exist in this crate:
//!
//! - environment unavailability (`StorageUnavailable`, `NetworkFailure`):
//!   absorbed where it happens, the caller sees degraded data plus an error
//!   condition, never a crash
//! - caller misuse (`NotEditable`, `MalformedImport`, `NothingToDelete`,
//!   `Validation`): rejected wholesale, no state change

use shared::models::{DraftError, ProductId};

/// Application-level error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppError {
    // ========== Environment ==========
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Network failure: {0}")]
    NetworkFailure(String),

    // ========== Caller Misuse ==========
    #[error("Product {0} is not a local product and cannot be modified")]
    NotEditable(ProductId),

    #[error("Favorites limit reached ({0})")]
    CapacityExceeded(usize),

    #[error("Malformed import: {0}")]
    MalformedImport(String),

    #[error("Nothing to delete: {0}")]
    NothingToDelete(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // ========== System ==========
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::NetworkFailure(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedImport(msg.into())
    }

    pub fn nothing_to_delete(msg: impl Into<String>) -> Self {
        Self::NothingToDelete(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable code for logs and UI mapping
    pub fn code(&self) -> &'static str {
        match self {
            AppError::StorageUnavailable(_) => "E9002",
            AppError::NetworkFailure(_) => "E9003",
            AppError::NotEditable(_) => "E2001",
            AppError::CapacityExceeded(_) => "E0005",
            AppError::MalformedImport(_) => "E0006",
            AppError::NothingToDelete(_) => "E0003",
            AppError::Validation(_) => "E0002",
            AppError::Internal(_) => "E9001",
        }
    }

    /// Environment errors degrade; everything else is the caller's fault
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AppError::StorageUnavailable(_) | AppError::NetworkFailure(_)
        )
    }
}

impl From<DraftError> for AppError {
    fn from(e: DraftError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<crate::storage::StorageError> for AppError {
    fn from(e: crate::storage::StorageError) -> Self {
        AppError::StorageUnavailable(e.to_string())
    }
}

impl From<crate::upstream::UpstreamError> for AppError {
    fn from(e: crate::upstream::UpstreamError) -> Self {
        AppError::NetworkFailure(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
