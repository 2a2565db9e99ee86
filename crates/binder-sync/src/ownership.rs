//! Ownership reconciliation against the shared ownership table
//!
//! A missing row for `(item_id, user_id)` means "owned, not tradeable". That
//! state is never written: a toggle that lands on it deletes the row instead.
//!
//! The store cannot delete rows, so a delete reads the table, clears it and
//! rewrites the survivors. Another client appending between the clear and the
//! rewrite can lose its row. When the lost row is still visible afterwards
//! (fewer rows rewritten than were appended, or a concurrent in-place edit)
//! the read-back check reports [`ConsistencyWarning::DeleteWindow`]; an append
//! overwritten by the rewrite itself cannot be detected.

use binder_sheets_client::{Range, Row, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

use crate::error::{ConsistencyWarning, Result, SyncError};
use crate::identity::Resolved;
use crate::remote::AuthorizedStore;

const TRUE: &str = "TRUE";
const TRADEABLE_COLUMN: usize = 3;

/// Composite key of an ownership record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OwnershipKey {
    pub item_id: String,
    pub user_id: String,
}

impl OwnershipKey {
    pub fn new(item_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// Ownership status of one item for one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    pub item_id: String,
    pub user_id: String,
    pub not_owned: bool,
    pub tradeable: bool,
    pub notes: Option<String>,
}

impl OwnershipRecord {
    /// The state implied by a missing row
    pub fn implicit(item_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            user_id: user_id.into(),
            not_owned: false,
            tradeable: false,
            notes: None,
        }
    }

    pub fn key(&self) -> OwnershipKey {
        OwnershipKey::new(self.item_id.clone(), self.user_id.clone())
    }

    /// True when this record carries nothing a missing row would not
    pub fn is_default(&self) -> bool {
        !self.not_owned && !self.tradeable && self.notes.is_none()
    }

    /// Parse `[itemId, userId, notOwned, tradeable, notes]`. Rows missing
    /// either key column are skipped.
    pub fn from_row(row: &Row) -> Option<Self> {
        let item_id = row.first().filter(|c| !c.is_empty())?;
        let user_id = row.get(1).filter(|c| !c.is_empty())?;
        let flag = |i: usize| row.get(i).is_some_and(|c| c == TRUE);
        Some(Self {
            item_id: item_id.clone(),
            user_id: user_id.clone(),
            not_owned: flag(2),
            tradeable: flag(3),
            notes: row.get(4).filter(|n| !n.is_empty()).cloned(),
        })
    }

    pub fn to_row(&self) -> Row {
        vec![
            self.item_id.clone(),
            self.user_id.clone(),
            flag_cell(self.not_owned),
            flag_cell(self.tradeable),
            self.notes.clone().unwrap_or_default(),
        ]
    }

    fn matches(&self, item_id: &str, user_id: &str) -> bool {
        self.item_id == item_id && self.user_id == user_id
    }
}

fn flag_cell(value: bool) -> String {
    if value {
        TRUE.to_string()
    } else {
        String::new()
    }
}

/// What a toggle did to the ownership table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowChange {
    Appended,
    Updated,
    Deleted,
    /// No write was issued
    Unchanged,
}

/// Outcome of a toggle: the canonical record to merge into local caches
#[derive(Debug, Clone, PartialEq)]
pub struct Toggle {
    pub record: OwnershipRecord,
    pub change: RowChange,
    pub warnings: Vec<ConsistencyWarning>,
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct OwnershipEngineConfig {
    /// Read the table back after a delete and warn if it changed underneath
    pub verify_deletes: bool,
}

impl Default for OwnershipEngineConfig {
    fn default() -> Self {
        Self { verify_deletes: true }
    }
}

/// Rows of the ownership table for one key, with their sheet row numbers
struct Located {
    rows: Vec<Row>,
    existing: Option<(u32, OwnershipRecord)>,
    warnings: Vec<ConsistencyWarning>,
}

enum Write {
    None,
    Append,
    Row(u32),
    TradeableCell(u32),
    Delete,
}

/// Stateless reconciliation engine; every call starts from a fresh read
#[derive(Clone)]
pub struct OwnershipEngine {
    store: AuthorizedStore,
    config: OwnershipEngineConfig,
}

impl OwnershipEngine {
    pub fn new(store: AuthorizedStore, config: OwnershipEngineConfig) -> Self {
        Self { store, config }
    }

    /// Records of one user. Missing records are not synthesized.
    pub async fn user_slice(&self, user_id: &str) -> Result<Resolved<Vec<OwnershipRecord>>> {
        let mut slice = self.all_slice().await?;
        slice.value.retain(|record| record.user_id == user_id);
        slice.warnings.retain(|warning| match warning {
            ConsistencyWarning::DuplicateOwnership { user_id: u, .. } => u == user_id,
            _ => true,
        });
        Ok(slice)
    }

    /// Records of every user. When a key appears twice the first row wins.
    pub async fn all_slice(&self) -> Result<Resolved<Vec<OwnershipRecord>>> {
        let rows = self.store.read_range(&Range::data(Table::Ownership)).await?;
        let records: Vec<OwnershipRecord> = rows.iter().filter_map(OwnershipRecord::from_row).collect();
        let warnings = duplicate_keys(&records);

        let mut seen = HashSet::new();
        let value = records
            .into_iter()
            .filter(|record| seen.insert(record.key()))
            .collect();
        Ok(Resolved { value, warnings })
    }

    /// Mark an item as not owned (or owned again). Always clears `tradeable`.
    pub async fn set_not_owned(&self, item_id: &str, user_id: &str, not_owned: bool) -> Result<Toggle> {
        let located = self.locate(item_id, user_id).await?;
        let target = OwnershipRecord {
            not_owned,
            ..OwnershipRecord::implicit(item_id, user_id)
        };

        let write = match &located.existing {
            Some(_) if target.is_default() => Write::Delete,
            Some((_, current)) if *current == target => Write::None,
            Some((row, _)) => Write::Row(*row),
            None if target.is_default() => Write::None,
            None => Write::Append,
        };
        self.apply(located, target, write).await
    }

    /// Offer an owned item for trade, or withdraw the offer.
    ///
    /// An existing row keeps its `not_owned` flag and only the tradeable cell
    /// is written, unless the result is the implicit default, in which case
    /// the row is deleted. Withdrawing an offer that was never stored is a no-op.
    pub async fn set_tradeable(&self, item_id: &str, user_id: &str, tradeable: bool) -> Result<Toggle> {
        let located = self.locate(item_id, user_id).await?;

        let (target, write) = match &located.existing {
            Some((row, current)) => {
                let target = OwnershipRecord {
                    tradeable,
                    ..current.clone()
                };
                let write = if target.is_default() {
                    Write::Delete
                } else if current.tradeable == tradeable {
                    Write::None
                } else {
                    Write::TradeableCell(*row)
                };
                (target, write)
            }
            None => {
                let target = OwnershipRecord {
                    tradeable,
                    ..OwnershipRecord::implicit(item_id, user_id)
                };
                let write = if tradeable { Write::Append } else { Write::None };
                (target, write)
            }
        };
        self.apply(located, target, write).await
    }

    async fn locate(&self, item_id: &str, user_id: &str) -> Result<Located> {
        let rows = self.store.read_range(&Range::data(Table::Ownership)).await?;

        let matches: Vec<(u32, OwnershipRecord)> = rows
            .iter()
            .enumerate()
            .filter_map(|(index, row)| {
                OwnershipRecord::from_row(row)
                    .filter(|record| record.matches(item_id, user_id))
                    .map(|record| (Table::FIRST_DATA_ROW + index as u32, record))
            })
            .collect();

        let mut warnings = Vec::new();
        if matches.len() > 1 {
            let warning = ConsistencyWarning::DuplicateOwnership {
                item_id: item_id.to_string(),
                user_id: user_id.to_string(),
                rows: matches.len(),
            };
            warn!("{}", warning);
            warnings.push(warning);
        }

        Ok(Located {
            existing: matches.into_iter().next(),
            rows,
            warnings,
        })
    }

    async fn apply(&self, located: Located, target: OwnershipRecord, write: Write) -> Result<Toggle> {
        let Located { rows, mut warnings, .. } = located;

        let change = match write {
            Write::None => RowChange::Unchanged,
            Write::Append => {
                self.store.append_row(Table::Ownership, target.to_row()).await?;
                debug!(item_id = %target.item_id, user_id = %target.user_id, "appended ownership row");
                RowChange::Appended
            }
            Write::Row(row) => {
                self.store
                    .update_range(&Range::row(Table::Ownership, row), vec![target.to_row()])
                    .await?;
                debug!(item_id = %target.item_id, user_id = %target.user_id, row, "updated ownership row");
                RowChange::Updated
            }
            Write::TradeableCell(row) => {
                self.store
                    .update_range(
                        &Range::cell(Table::Ownership, TRADEABLE_COLUMN, row),
                        vec![vec![flag_cell(target.tradeable)]],
                    )
                    .await?;
                debug!(item_id = %target.item_id, user_id = %target.user_id, row, "updated tradeable cell");
                RowChange::Updated
            }
            Write::Delete => {
                warnings.extend(self.delete(rows, &target.item_id, &target.user_id).await?);
                RowChange::Deleted
            }
        };

        Ok(Toggle {
            record: target,
            change,
            warnings,
        })
    }

    /// Remove every row for the key by clearing the table and rewriting the rest.
    /// Blank rows are compacted away.
    async fn delete(&self, rows: Vec<Row>, item_id: &str, user_id: &str) -> Result<Vec<ConsistencyWarning>> {
        let survivors: Vec<Row> = rows
            .into_iter()
            .filter(|row| match OwnershipRecord::from_row(row) {
                Some(record) => !record.matches(item_id, user_id),
                None => !is_blank(row),
            })
            .map(pad)
            .collect();

        let data = Range::data(Table::Ownership);
        self.store.clear_range(&data).await?;

        if !survivors.is_empty() {
            let last = Table::FIRST_DATA_ROW + survivors.len() as u32 - 1;
            let range = Range::rows(Table::Ownership, Table::FIRST_DATA_ROW, last);
            if let Err(source) = self.store.update_range(&range, survivors.clone()).await {
                error!(
                    pending = survivors.len(),
                    "ownership table cleared but rewrite failed: {}", source
                );
                return Err(SyncError::RewriteInterrupted {
                    pending: survivors,
                    source: Box::new(source),
                });
            }
        }
        info!(item_id, user_id, remaining = survivors.len(), "deleted ownership row");

        if !self.config.verify_deletes {
            return Ok(Vec::new());
        }
        match self.store.read_range(&data).await {
            Ok(observed) => {
                let observed: Vec<Row> = observed.into_iter().map(trim).collect();
                let expected: Vec<Row> = survivors.into_iter().map(trim).collect();
                if observed == expected {
                    Ok(Vec::new())
                } else {
                    let warning = ConsistencyWarning::DeleteWindow {
                        expected_rows: expected.len(),
                        observed_rows: observed.len(),
                    };
                    warn!("{}", warning);
                    Ok(vec![warning])
                }
            }
            Err(e) => {
                warn!("could not verify ownership table after delete: {}", e);
                Ok(Vec::new())
            }
        }
    }
}

fn duplicate_keys(records: &[OwnershipRecord]) -> Vec<ConsistencyWarning> {
    let mut counts: std::collections::BTreeMap<OwnershipKey, usize> = Default::default();
    for record in records {
        *counts.entry(record.key()).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, rows)| *rows > 1)
        .map(|(key, rows)| ConsistencyWarning::DuplicateOwnership {
            item_id: key.item_id,
            user_id: key.user_id,
            rows,
        })
        .collect()
}

fn is_blank(row: &Row) -> bool {
    row.iter().all(|cell| cell.is_empty())
}

fn pad(mut row: Row) -> Row {
    row.resize(Table::Ownership.width(), String::new());
    row
}

fn trim(mut row: Row) -> Row {
    while row.last().is_some_and(|cell| cell.is_empty()) {
        row.pop();
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::CountingConsent;
    use crate::session::{Credential, MemoryCredentialStore, Session};
    use async_trait::async_trait;
    use binder_sheets_client::{AccessToken, InMemoryStore, StoreCall, StoreError, TabularStore};
    use std::sync::Arc;

    fn engine_over(store: Arc<dyn TabularStore>) -> OwnershipEngine {
        let session = Session::new(
            Arc::new(CountingConsent::new()),
            Arc::new(MemoryCredentialStore::with_credential(Credential::new(AccessToken::new("t")))),
        );
        OwnershipEngine::new(
            AuthorizedStore::new(store, Arc::new(session)),
            OwnershipEngineConfig::default(),
        )
    }

    fn engine(memory: &InMemoryStore) -> OwnershipEngine {
        engine_over(Arc::new(memory.clone()))
    }

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_row_codec() {
        let record = OwnershipRecord::from_row(&row(&["C1", "u1", "TRUE", "yes", ""])).unwrap();
        assert!(record.not_owned);
        assert!(!record.tradeable);
        assert_eq!(record.notes, None);
        assert_eq!(record.to_row(), row(&["C1", "u1", "TRUE", "", ""]));

        assert!(OwnershipRecord::from_row(&row(&["C1"])).is_none());
        assert!(OwnershipRecord::implicit("C1", "u1").is_default());
    }

    #[tokio::test]
    async fn test_missing_record_yields_no_slice_entry() {
        let memory = InMemoryStore::new();
        memory.seed(Table::Ownership, vec![row(&["C2", "u2", "TRUE"])]).await;

        let slice = engine(&memory).user_slice("u1").await.unwrap();
        assert!(slice.value.is_empty());
        let all = engine(&memory).all_slice().await.unwrap();
        assert!(all.value.iter().all(|r| r.key() != OwnershipKey::new("C1", "u1")));
    }

    #[tokio::test]
    async fn test_tradeable_on_empty_table_appends_owned_row() {
        let memory = InMemoryStore::new();

        let toggle = engine(&memory).set_tradeable("C1", "u1", true).await.unwrap();

        assert_eq!(toggle.change, RowChange::Appended);
        assert!(!toggle.record.not_owned);
        assert!(toggle.record.tradeable);
        assert_eq!(toggle.record.to_row(), row(&["C1", "u1", "", "TRUE", ""]));
        assert_eq!(memory.calls().await.last(), Some(&StoreCall::Append(Table::Ownership)));
        // Reads drop trailing blank cells
        assert_eq!(memory.rows(Table::Ownership).await, vec![row(&["C1", "u1", "", "TRUE"])]);
    }

    #[tokio::test]
    async fn test_withdrawing_absent_offer_is_noop() {
        let memory = InMemoryStore::new();
        memory.seed(Table::Ownership, vec![row(&["C2", "u1", "TRUE"])]).await;

        let toggle = engine(&memory).set_tradeable("C1", "u1", false).await.unwrap();

        assert_eq!(toggle.change, RowChange::Unchanged);
        assert!(toggle.record.is_default());
        assert_eq!(memory.rows(Table::Ownership).await.len(), 1);
        assert_eq!(memory.write_count().await, 0);
    }

    #[tokio::test]
    async fn test_not_owned_round_trip_leaves_no_row() {
        let memory = InMemoryStore::new();
        let engine = engine(&memory);

        let first = engine.set_not_owned("C1", "u1", true).await.unwrap();
        assert_eq!(first.change, RowChange::Appended);
        assert_eq!(memory.rows(Table::Ownership).await, vec![row(&["C1", "u1", "TRUE"])]);

        let second = engine.set_not_owned("C1", "u1", false).await.unwrap();
        assert_eq!(second.change, RowChange::Deleted);
        assert!(second.record.is_default());
        assert!(memory.rows(Table::Ownership).await.is_empty());
    }

    #[tokio::test]
    async fn test_not_owned_clears_prior_trade_offer() {
        let memory = InMemoryStore::new();
        memory
            .seed(Table::Ownership, vec![row(&["C0", "u2", "TRUE"]), row(&["C1", "u1", "", "TRUE"])])
            .await;

        let toggle = engine(&memory).set_not_owned("C1", "u1", true).await.unwrap();

        assert_eq!(toggle.change, RowChange::Updated);
        assert!(toggle.record.not_owned);
        assert!(!toggle.record.tradeable);
        assert!(memory
            .calls()
            .await
            .contains(&StoreCall::Update(Range::row(Table::Ownership, 3))));
        assert_eq!(memory.rows(Table::Ownership).await[1], row(&["C1", "u1", "TRUE"]));
    }

    #[tokio::test]
    async fn test_owned_again_removes_row_and_shrinks_table() {
        let memory = InMemoryStore::new();
        memory
            .seed(
                Table::Ownership,
                vec![
                    row(&["C0", "u2", "TRUE"]),
                    row(&["C1", "u1", "TRUE", "TRUE", ""]),
                    row(&["C3", "u1", "", "TRUE"]),
                ],
            )
            .await;

        let toggle = engine(&memory).set_not_owned("C1", "u1", false).await.unwrap();

        assert_eq!(toggle.change, RowChange::Deleted);
        assert!(toggle.warnings.is_empty());
        assert_eq!(
            memory.rows(Table::Ownership).await,
            vec![row(&["C0", "u2", "TRUE"]), row(&["C3", "u1", "", "TRUE"])]
        );
    }

    #[tokio::test]
    async fn test_repeated_toggle_overwrites_instead_of_duplicating() {
        let memory = InMemoryStore::new();
        let engine = engine(&memory);

        engine.set_tradeable("C1", "u1", true).await.unwrap();
        engine.set_not_owned("C1", "u1", true).await.unwrap();
        let again = engine.set_not_owned("C1", "u1", true).await.unwrap();

        assert_eq!(again.change, RowChange::Unchanged);
        assert_eq!(memory.rows(Table::Ownership).await, vec![row(&["C1", "u1", "TRUE"])]);
    }

    #[tokio::test]
    async fn test_tradeable_update_touches_only_its_cell() {
        let memory = InMemoryStore::new();
        memory
            .seed(Table::Ownership, vec![row(&["C1", "u1", "TRUE", "", "mint"])])
            .await;

        let toggle = engine(&memory).set_tradeable("C1", "u1", true).await.unwrap();

        assert_eq!(toggle.change, RowChange::Updated);
        assert!(toggle.record.not_owned);
        assert_eq!(toggle.record.notes.as_deref(), Some("mint"));
        assert!(memory
            .calls()
            .await
            .contains(&StoreCall::Update(Range::cell(Table::Ownership, 3, 2))));
        assert_eq!(
            memory.rows(Table::Ownership).await,
            vec![row(&["C1", "u1", "TRUE", "TRUE", "mint"])]
        );
    }

    #[tokio::test]
    async fn test_withdrawn_offer_returning_to_default_deletes_row() {
        let memory = InMemoryStore::new();
        memory.seed(Table::Ownership, vec![row(&["C1", "u1", "", "TRUE"])]).await;

        let toggle = engine(&memory).set_tradeable("C1", "u1", false).await.unwrap();

        assert_eq!(toggle.change, RowChange::Deleted);
        assert!(memory.rows(Table::Ownership).await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_rows_warn_and_delete_removes_all() {
        let memory = InMemoryStore::new();
        memory
            .seed(
                Table::Ownership,
                vec![
                    row(&["C1", "u1", "TRUE"]),
                    row(&["C2", "u1", "TRUE"]),
                    row(&["C1", "u1", "TRUE"]),
                ],
            )
            .await;
        let engine = engine(&memory);

        let slice = engine.user_slice("u1").await.unwrap();
        assert_eq!(slice.value.len(), 2);
        assert_eq!(slice.warnings.len(), 1);

        let toggle = engine.set_not_owned("C1", "u1", false).await.unwrap();
        assert_eq!(
            toggle.warnings,
            vec![ConsistencyWarning::DuplicateOwnership {
                item_id: "C1".into(),
                user_id: "u1".into(),
                rows: 2,
            }]
        );
        assert_eq!(memory.rows(Table::Ownership).await, vec![row(&["C2", "u1", "TRUE"])]);
    }

    #[tokio::test]
    async fn test_append_during_delete_window_is_reported() {
        let memory = InMemoryStore::new();
        memory.seed(Table::Ownership, vec![row(&["C1", "u1", "TRUE"])]).await;
        memory
            .append_after_next_clear(Table::Ownership, row(&["C9", "u2", "TRUE"]))
            .await;

        let toggle = engine(&memory).set_not_owned("C1", "u1", false).await.unwrap();

        assert_eq!(toggle.change, RowChange::Deleted);
        assert_eq!(
            toggle.warnings,
            vec![ConsistencyWarning::DeleteWindow {
                expected_rows: 0,
                observed_rows: 1,
            }]
        );
    }

    /// Delegates to an [`InMemoryStore`] but fails every multi-row update
    struct FailingRewrite(InMemoryStore);

    #[async_trait]
    impl TabularStore for FailingRewrite {
        async fn read_range(&self, token: &AccessToken, range: &Range) -> binder_sheets_client::Result<Vec<Row>> {
            self.0.read_range(token, range).await
        }

        async fn append_row(&self, token: &AccessToken, table: Table, row: Row) -> binder_sheets_client::Result<()> {
            self.0.append_row(token, table, row).await
        }

        async fn update_range(
            &self,
            token: &AccessToken,
            range: &Range,
            rows: Vec<Row>,
        ) -> binder_sheets_client::Result<()> {
            if rows.len() > 1 {
                return Err(StoreError::Transport("connection reset".into()));
            }
            self.0.update_range(token, range, rows).await
        }

        async fn clear_range(&self, token: &AccessToken, range: &Range) -> binder_sheets_client::Result<()> {
            self.0.clear_range(token, range).await
        }
    }

    #[tokio::test]
    async fn test_failed_rewrite_returns_pending_rows() {
        let memory = InMemoryStore::new();
        memory
            .seed(
                Table::Ownership,
                vec![row(&["C1", "u1", "TRUE"]), row(&["C2", "u2", "TRUE"]), row(&["C3", "u2", "TRUE"])],
            )
            .await;

        let err = engine_over(Arc::new(FailingRewrite(memory.clone())))
            .set_not_owned("C1", "u1", false)
            .await
            .unwrap_err();

        match err {
            SyncError::RewriteInterrupted { pending, source } => {
                assert_eq!(
                    pending,
                    vec![row(&["C2", "u2", "TRUE", "", ""]), row(&["C3", "u2", "TRUE", "", ""])]
                );
                assert!(source.is_transport());
            }
            other => panic!("expected RewriteInterrupted, got {other:?}"),
        }
        assert!(memory.rows(Table::Ownership).await.is_empty());
    }
}
