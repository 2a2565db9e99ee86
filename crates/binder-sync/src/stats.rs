//! Aggregates derived from the catalog and ownership slices

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::catalog::CatalogItem;
use crate::ownership::OwnershipRecord;

/// Owned versus total for one category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTally {
    pub total: usize,
    pub owned: usize,
}

/// Collection progress of one user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionStats {
    pub total: usize,
    pub owned: usize,
    /// Percentage owned, 0 for an empty catalog
    pub completion_rate: f64,
    pub by_category: BTreeMap<String, CategoryTally>,
}

fn missing_ids<'a>(slice: &'a [OwnershipRecord], user_id: &str) -> HashSet<&'a str> {
    slice
        .iter()
        .filter(|record| record.user_id == user_id && record.not_owned)
        .map(|record| record.item_id.as_str())
        .collect()
}

impl CollectionStats {
    /// Items without a not-owned record count as owned. Records for items
    /// outside the catalog are ignored.
    pub fn for_user(catalog: &[CatalogItem], slice: &[OwnershipRecord], user_id: &str) -> Self {
        let missing = missing_ids(slice, user_id);

        let mut by_category: BTreeMap<String, CategoryTally> = BTreeMap::new();
        let mut owned = 0;
        for item in catalog {
            let tally = by_category.entry(item.category.clone()).or_default();
            tally.total += 1;
            if !missing.contains(item.id.as_str()) {
                tally.owned += 1;
                owned += 1;
            }
        }

        let total = catalog.len();
        let completion_rate = if total > 0 {
            owned as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total,
            owned,
            completion_rate,
            by_category,
        }
    }
}

/// Catalog items the user has marked as not owned, in catalog order
pub fn missing_items<'a>(
    catalog: &'a [CatalogItem],
    slice: &[OwnershipRecord],
    user_id: &str,
) -> Vec<&'a CatalogItem> {
    let missing = missing_ids(slice, user_id);
    catalog
        .iter()
        .filter(|item| missing.contains(item.id.as_str()))
        .collect()
}

/// Who lacks an item and who offers it, across all users
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ItemDemand {
    pub item_id: String,
    pub missing: Vec<String>,
    /// Users with a trade offer, paired with whether they actually own the item
    pub offers: Vec<(String, bool)>,
}

impl ItemDemand {
    pub fn for_item(all_slice: &[OwnershipRecord], item_id: &str) -> Self {
        let records = all_slice.iter().filter(|record| record.item_id == item_id);
        let mut demand = Self {
            item_id: item_id.to_string(),
            ..Self::default()
        };
        for record in records {
            if record.not_owned {
                demand.missing.push(record.user_id.clone());
            }
            if record.tradeable {
                demand.offers.push((record.user_id.clone(), !record.not_owned));
            }
        }
        demand
    }

    /// True when some other user both owns the item and offers it
    pub fn can_receive_from_others(&self, user_id: &str) -> bool {
        self.offers
            .iter()
            .any(|(offerer, owns)| offerer != user_id && *owns)
    }
}
