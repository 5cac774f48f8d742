//! Upstream product API
//!
//! The catalog only needs two reads: the product list and the category
//! list. `ProductSource` is the seam; `HttpProductSource` is the real client.

pub mod client;

pub use client::HttpProductSource;

use async_trait::async_trait;
use shared::models::RemoteProduct;
use thiserror::Error;

/// Upstream fetch errors
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

pub type UpstreamResult<T> = Result<T, UpstreamError>;

/// Source of remote catalog data
#[async_trait]
pub trait ProductSource: Send + Sync {
    /// `GET /products`
    async fn fetch_products(&self) -> UpstreamResult<Vec<RemoteProduct>>;

    /// `GET /products/categories` (raw upstream names, untranslated)
    async fn fetch_categories(&self) -> UpstreamResult<Vec<String>>;
}
