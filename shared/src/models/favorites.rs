//! Favorites export format

use serde::{Deserialize, Serialize};

use super::ProductId;

/// Portable favorites snapshot
///
/// ```json
/// { "favorites": [1, 5, 1001], "count": 3, "exportedAt": "2025-01-01T10:00:00.000Z" }
/// ```
///
/// Unknown fields are rejected; import accepts exactly this shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FavoritesExport {
    pub favorites: Vec<ProductId>,
    pub count: usize,
    #[serde(rename = "exportedAt")]
    pub exported_at: String,
}

impl FavoritesExport {
    pub fn new(favorites: Vec<ProductId>, exported_at: String) -> Self {
        Self {
            count: favorites.len(),
            favorites,
            exported_at,
        }
    }

    /// Shape check beyond what serde enforces
    pub fn validate(&self) -> Result<(), String> {
        chrono::DateTime::parse_from_rfc3339(&self.exported_at)
            .map_err(|e| format!("exportedAt is not ISO-8601: {}", e))?;
        Ok(())
    }
}
