//! Test doubles shared by the unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::models::{Rating, RemoteProduct};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::upstream::{ProductSource, UpstreamError, UpstreamResult};

/// Scripted upstream: serves fixed data until told to fail
#[derive(Debug, Default)]
pub struct StaticSource {
    products: Mutex<Vec<RemoteProduct>>,
    categories: Mutex<Vec<String>>,
    fail_products: Mutex<bool>,
    fail_categories: Mutex<bool>,
    pub product_calls: AtomicUsize,
}

impl StaticSource {
    pub fn new(products: Vec<RemoteProduct>, categories: Vec<&str>) -> Self {
        Self {
            products: Mutex::new(products),
            categories: Mutex::new(categories.into_iter().map(String::from).collect()),
            ..Default::default()
        }
    }

    /// One product per id, cycling through the default upstream categories
    pub fn with_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let upstream = ["electronics", "jewelery", "men's clothing", "women's clothing"];
        let products = ids
            .into_iter()
            .map(|id| remote(id, upstream[(id as usize) % upstream.len()]))
            .collect();
        Self::new(products, upstream.to_vec())
    }

    pub fn set_products(&self, products: Vec<RemoteProduct>) {
        *self.products.lock() = products;
    }

    pub fn fail(&self, products: bool, categories: bool) {
        *self.fail_products.lock() = products;
        *self.fail_categories.lock() = categories;
    }

    pub fn calls(&self) -> usize {
        self.product_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductSource for StaticSource {
    async fn fetch_products(&self) -> UpstreamResult<Vec<RemoteProduct>> {
        self.product_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_products.lock() {
            return Err(UpstreamError::Timeout(10_000));
        }
        Ok(self.products.lock().clone())
    }

    async fn fetch_categories(&self) -> UpstreamResult<Vec<String>> {
        if *self.fail_categories.lock() {
            return Err(UpstreamError::Timeout(10_000));
        }
        Ok(self.categories.lock().clone())
    }
}

pub fn remote(id: i64, category: &str) -> RemoteProduct {
    RemoteProduct {
        id,
        title: format!("Producto {id}"),
        description: format!("Descripción del producto {id}"),
        price: 10.0 + id as f64,
        category: category.to_string(),
        image: format!("https://img.example/{id}.png"),
        rating: Some(Rating {
            rate: 4.1,
            count: 120,
        }),
    }
}
