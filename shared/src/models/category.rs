//! Category labels
//!
//! Categories are not stored entities: the catalog derives them from the
//! upstream category list plus whatever local products use. This module only
//! owns the translation from upstream category strings to display labels.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upstream category -> display label table
///
/// Supplied by the caller; `Default` carries the storefront's Spanish labels.
/// Categories missing from the table get their first letter capitalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLabels {
    labels: HashMap<String, String>,
}

impl CategoryLabels {
    pub fn new(labels: HashMap<String, String>) -> Self {
        Self { labels }
    }

    /// Empty table: every category falls back to capitalization
    pub fn empty() -> Self {
        Self {
            labels: HashMap::new(),
        }
    }

    pub fn with_label(mut self, upstream: impl Into<String>, label: impl Into<String>) -> Self {
        self.labels.insert(upstream.into(), label.into());
        self
    }

    /// Display label for an upstream category
    pub fn label(&self, upstream: &str) -> String {
        match self.labels.get(upstream) {
            Some(label) => label.clone(),
            None => capitalize_first(upstream),
        }
    }

    /// Labels served when the category fetch fails and nothing is cached
    pub fn fallback_categories() -> Vec<String> {
        ["Electrónicos", "Ropa Masculina", "Ropa Femenina", "Joyería"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

impl Default for CategoryLabels {
    fn default() -> Self {
        Self::empty()
            .with_label("men's clothing", "Ropa Masculina")
            .with_label("women's clothing", "Ropa Femenina")
            .with_label("jewelery", "Joyería")
            .with_label("electronics", "Electrónicos")
    }
}

fn capitalize_first(raw: &str) -> String {
    let mut chars = raw.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
