//! Composite-keyed ownership cache

use std::collections::BTreeMap;

use crate::ownership::{OwnershipKey, OwnershipRecord};

/// Ownership records keyed by `(item_id, user_id)`.
///
/// Only non-default records are held; a missing entry reads as the implicit
/// default.
#[derive(Debug, Clone, Default)]
pub struct OwnershipCache {
    records: BTreeMap<OwnershipKey, OwnershipRecord>,
}

impl OwnershipCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole cache with a freshly read slice
    pub fn replace_all(&mut self, records: impl IntoIterator<Item = OwnershipRecord>) {
        self.records = records
            .into_iter()
            .filter(|record| !record.is_default())
            .map(|record| (record.key(), record))
            .collect();
    }

    /// Merge one confirmed record: remove on implicit default, insert or replace otherwise
    pub fn apply(&mut self, record: &OwnershipRecord) {
        if record.is_default() {
            self.records.remove(&record.key());
        } else {
            self.records.insert(record.key(), record.clone());
        }
    }

    /// The stored record, or the implicit default
    pub fn status(&self, item_id: &str, user_id: &str) -> OwnershipRecord {
        self.records
            .get(&OwnershipKey::new(item_id, user_id))
            .cloned()
            .unwrap_or_else(|| OwnershipRecord::implicit(item_id, user_id))
    }

    pub fn records(&self) -> impl Iterator<Item = &OwnershipRecord> {
        self.records.values()
    }

    /// Every stored record for one item, across users
    pub fn for_item<'a>(&'a self, item_id: &'a str) -> impl Iterator<Item = &'a OwnershipRecord> + 'a {
        self.records.values().filter(move |record| record.item_id == item_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The per-user and all-users caches, mutated as one
#[derive(Debug, Clone, Default)]
pub struct LocalCaches {
    user_id: Option<String>,
    per_user: OwnershipCache,
    all_users: OwnershipCache,
}

impl LocalCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset both caches for a newly signed-in user (or none)
    pub fn reset(&mut self, user_id: Option<String>) {
        *self = Self {
            user_id,
            ..Self::default()
        };
    }

    /// Replace both caches from fresh slices
    pub fn replace(&mut self, per_user: Vec<OwnershipRecord>, all_users: Vec<OwnershipRecord>) {
        self.per_user.replace_all(per_user);
        self.all_users.replace_all(all_users);
    }

    /// Merge one confirmed record into both caches
    pub fn apply(&mut self, record: &OwnershipRecord) {
        if self.user_id.as_deref() == Some(record.user_id.as_str()) {
            self.per_user.apply(record);
        }
        self.all_users.apply(record);
    }

    pub fn per_user(&self) -> &OwnershipCache {
        &self.per_user
    }

    pub fn all_users(&self) -> &OwnershipCache {
        &self.all_users
    }
}
