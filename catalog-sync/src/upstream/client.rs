//! HTTP client for the upstream product API

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use shared::models::RemoteProduct;
use std::time::Duration;

use super::{ProductSource, UpstreamError, UpstreamResult};

/// reqwest-backed `ProductSource`
#[derive(Debug, Clone)]
pub struct HttpProductSource {
    client: Client,
    base_url: String,
    timeout_ms: u64,
}

impl HttpProductSource {
    /// Create a client with a per-request timeout
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> UpstreamResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make a GET request
    async fn get<T: DeserializeOwned>(&self, path: &str) -> UpstreamResult<T> {
        let url = format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        tracing::debug!(%url, "Upstream GET");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(self.timeout_ms)
            } else {
                UpstreamError::Http(e)
            }
        })?;
        Self::handle_response(response).await
    }

    /// Handle the HTTP response
    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> UpstreamResult<T> {
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| UpstreamError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl ProductSource for HttpProductSource {
    async fn fetch_products(&self) -> UpstreamResult<Vec<RemoteProduct>> {
        self.get("products").await
    }

    async fn fetch_categories(&self) -> UpstreamResult<Vec<String>> {
        self.get("products/categories").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keeps_base_url() {
        let source =
            HttpProductSource::new("https://fakestoreapi.com/", Duration::from_secs(10)).unwrap();
        assert_eq!(source.base_url(), "https://fakestoreapi.com/");
        assert_eq!(source.timeout_ms, 10_000);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_http_error() {
        // port 9 on loopback: nothing listens there
        let source =
            HttpProductSource::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = source.fetch_products().await.unwrap_err();
        assert!(matches!(
            err,
            UpstreamError::Http(_) | UpstreamError::Timeout(_)
        ));
    }
}
