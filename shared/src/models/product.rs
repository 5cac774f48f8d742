//! Product Model

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use super::CategoryLabels;

pub type ProductId = i64;

/// Upper bound accepted for locally authored prices
pub const MAX_PRICE: Decimal = Decimal::from_parts(99_999_999, 0, 0, false, 2);

const MIN_NAME_CHARS: usize = 3;
const MIN_DESCRIPTION_CHARS: usize = 10;

/// Upstream rating block, carried through verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub rate: f64,
    pub count: u32,
}

/// Product entity (merged catalog shape)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    /// Formatted currency string, e.g. `"$1,499.99"`
    pub price: String,
    /// Display label (already translated)
    pub category: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<Rating>,
    /// true = authored in this app, mutable and deletable
    #[serde(default)]
    pub is_local: bool,
}

impl Product {
    /// Parsed price, `None` when the stored string is not a valid amount
    pub fn price_value(&self) -> Option<Decimal> {
        parse_price(&self.price)
    }

    /// Case-insensitive substring match over name, description and category
    ///
    /// `lowered_term` must already be lowercase.
    pub fn matches_term(&self, lowered_term: &str) -> bool {
        self.name.to_lowercase().contains(lowered_term)
            || self.description.to_lowercase().contains(lowered_term)
            || self.category.to_lowercase().contains(lowered_term)
    }
}

/// Raw product as served by the upstream API (`GET /products`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteProduct {
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub category: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub rating: Option<Rating>,
}

impl RemoteProduct {
    /// Map into the internal shape, translating the category label
    pub fn into_product(self, labels: &CategoryLabels) -> Product {
        let price = Decimal::try_from(self.price)
            .map(format_price)
            .unwrap_or_else(|_| format!("${:.2}", self.price));
        Product {
            id: self.id,
            name: self.title,
            description: self.description,
            price,
            category: labels.label(&self.category),
            image_url: self.image,
            rating: self.rating,
            is_local: false,
        }
    }
}

/// Draft validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    #[error("name must have at least 3 characters")]
    NameTooShort,

    #[error("description must have at least 10 characters")]
    DescriptionTooShort,

    #[error("invalid price: {0}")]
    InvalidPrice(String),

    #[error("price must be greater than 0 and at most 999999.99")]
    PriceOutOfRange,

    #[error("category is required")]
    MissingCategory,
}

/// Create local product payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    pub description: String,
    /// Accepts `"12.5"`, `"$12.50"` or `"$1,299.00"`
    pub price: String,
    pub category: String,
    #[serde(default)]
    pub image_url: String,
}

impl ProductDraft {
    pub fn validate(&self) -> Result<(), DraftError> {
        validate_name(&self.name)?;
        validate_description(&self.description)?;
        validate_price(&self.price)?;
        if self.category.trim().is_empty() {
            return Err(DraftError::MissingCategory);
        }
        Ok(())
    }

    /// Build the local product, normalizing the price format
    pub fn into_product(self, id: ProductId) -> Result<Product, DraftError> {
        let price = validate_price(&self.price)?;
        Ok(Product {
            id,
            name: self.name.trim().to_string(),
            description: self.description.trim().to_string(),
            price: format_price(price),
            category: self.category.trim().to_string(),
            image_url: self.image_url,
            rating: None,
            is_local: true,
        })
    }
}

/// Update product payload (id and locality are not patchable)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

impl ProductPatch {
    pub fn validate(&self) -> Result<(), DraftError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if let Some(description) = &self.description {
            validate_description(description)?;
        }
        if let Some(price) = &self.price {
            validate_price(price)?;
        }
        if matches!(&self.category, Some(c) if c.trim().is_empty()) {
            return Err(DraftError::MissingCategory);
        }
        Ok(())
    }

    /// Merge into an existing record; call `validate` first
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name = name.trim().to_string();
        }
        if let Some(description) = &self.description {
            product.description = description.trim().to_string();
        }
        if let Some(price) = self.price.as_deref().and_then(parse_price) {
            product.price = format_price(price);
        }
        if let Some(category) = &self.category {
            product.category = category.trim().to_string();
        }
        if let Some(image_url) = &self.image_url {
            product.image_url = image_url.clone();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.category.is_none()
            && self.image_url.is_none()
    }
}

fn validate_name(name: &str) -> Result<(), DraftError> {
    if name.trim().chars().count() < MIN_NAME_CHARS {
        return Err(DraftError::NameTooShort);
    }
    Ok(())
}

fn validate_description(description: &str) -> Result<(), DraftError> {
    if description.trim().chars().count() < MIN_DESCRIPTION_CHARS {
        return Err(DraftError::DescriptionTooShort);
    }
    Ok(())
}

fn validate_price(raw: &str) -> Result<Decimal, DraftError> {
    let price = parse_price(raw).ok_or_else(|| DraftError::InvalidPrice(raw.to_string()))?;
    if price <= Decimal::ZERO || price > MAX_PRICE {
        return Err(DraftError::PriceOutOfRange);
    }
    Ok(price)
}

/// Parse a formatted currency string (`"$1,499.99"`, `"12.5"`)
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(cleaned.trim()).ok()
}

/// Format an amount as `"$<amount>"` with two decimals
pub fn format_price(amount: Decimal) -> String {
    format!("${:.2}", amount.round_dp(2))
}
