//! Read-only catalog of collectible items

use binder_sheets_client::{Range, Row, Table};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::remote::AuthorizedStore;

/// An item in the shared catalog. Curated elsewhere; never written here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    /// Printed collector number, kept verbatim (may be zero-padded)
    pub number: String,
    pub name: String,
    /// Rarity tier
    pub category: String,
    /// Expansion / pack the item belongs to
    pub group: String,
    pub image_ref: Option<String>,
}

impl CatalogItem {
    /// Parse an `[id, number, name, category, group, imageRef]` row
    pub fn from_row(row: &Row) -> Option<Self> {
        let id = row.first().filter(|id| !id.is_empty())?;
        let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
        Some(Self {
            id: id.clone(),
            number: cell(1),
            name: cell(2),
            category: cell(3),
            group: cell(4),
            image_ref: row.get(5).filter(|r| !r.is_empty()).cloned(),
        })
    }

    /// Collector number as an integer, 0 when it does not parse
    pub fn ordinal(&self) -> u32 {
        self.number.trim().parse().unwrap_or(0)
    }

    /// Case-insensitive match on name, or substring match on number
    pub fn matches(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(&query.to_lowercase()) || self.number.contains(query)
    }
}

/// Reads the catalog table
#[derive(Clone)]
pub struct CatalogReader {
    store: AuthorizedStore,
}

impl CatalogReader {
    pub fn new(store: AuthorizedStore) -> Self {
        Self { store }
    }

    /// Every catalog item, ordered by collector number (stable for ties)
    pub async fn list_items(&self) -> Result<Vec<CatalogItem>> {
        let rows = self.store.read_range(&Range::data(Table::Items)).await?;
        let mut items: Vec<CatalogItem> = rows.iter().filter_map(CatalogItem::from_row).collect();
        items.sort_by_key(CatalogItem::ordinal);
        Ok(items)
    }
}
