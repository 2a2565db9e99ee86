//! In-process store with the same range semantics as the spreadsheet API
//!
//! Used by tests and offline runs. Supports fault injection so callers can
//! exercise re-authentication and transport failures, and can interleave a
//! foreign append into the clear+rewrite window.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::store::TabularStore;
use crate::types::{AccessToken, Range, Row, Table};

/// A recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Read(Range),
    Append(Table),
    Update(Range),
    Clear(Range),
}

impl StoreCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, StoreCall::Read(_))
    }
}

#[derive(Default)]
struct State {
    /// Index 0 is sheet row 1 (the header)
    grids: HashMap<Table, Vec<Row>>,
    valid_token: Option<AccessToken>,
    fail_unauthorized: u32,
    fail_transport: u32,
    after_clear: Vec<(Table, Row)>,
    calls: Vec<StoreCall>,
}

/// In-memory tabular store
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create a store with the three tables and their header rows
    pub fn new() -> Self {
        let mut grids = HashMap::new();
        grids.insert(Table::Items, vec![header(&["id", "number", "name", "category", "group", "imageRef"])]);
        grids.insert(Table::Users, vec![header(&["id", "displayName", "email"])]);
        grids.insert(Table::Ownership, vec![header(&["itemId", "userId", "notOwned", "tradeable", "notes"])]);

        Self {
            state: Arc::new(RwLock::new(State {
                grids,
                ..Default::default()
            })),
        }
    }

    /// Append data rows directly, bypassing faults and call recording
    pub async fn seed(&self, table: Table, rows: Vec<Row>) {
        let mut state = self.state.write().await;
        let grid = state.grids.entry(table).or_default();
        for row in rows {
            let at = last_non_empty(grid) + 1;
            write_row(grid, at, 0, row);
        }
    }

    /// Data rows (below the header) as a read of `Range::data` would return them
    pub async fn rows(&self, table: Table) -> Vec<Row> {
        let state = self.state.read().await;
        read_grid(state.grids.get(&table), &Range::data(table))
    }

    /// Only accept this token; any other yields `Unauthorized`
    pub async fn require_token(&self, token: Option<AccessToken>) {
        self.state.write().await.valid_token = token;
    }

    /// Fail the next `n` calls with `Unauthorized`
    pub async fn fail_next_unauthorized(&self, n: u32) {
        self.state.write().await.fail_unauthorized = n;
    }

    /// Fail the next `n` calls with a transport error
    pub async fn fail_next_transport(&self, n: u32) {
        self.state.write().await.fail_transport = n;
    }

    /// Simulate another client appending `row` right after the next clear of `table`
    pub async fn append_after_next_clear(&self, table: Table, row: Row) {
        self.state.write().await.after_clear.push((table, row));
    }

    /// Every call made so far, in order
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.state.read().await.calls.clone()
    }

    pub async fn write_count(&self) -> usize {
        self.state.read().await.calls.iter().filter(|c| c.is_write()).count()
    }

    async fn begin(&self, token: &AccessToken, call: StoreCall) -> Result<()> {
        let mut state = self.state.write().await;
        state.calls.push(call);

        if state.fail_transport > 0 {
            state.fail_transport -= 1;
            return Err(StoreError::Transport("injected transport failure".into()));
        }
        if state.fail_unauthorized > 0 {
            state.fail_unauthorized -= 1;
            return Err(StoreError::Unauthorized("injected credential rejection".into()));
        }
        if let Some(valid) = &state.valid_token {
            if valid != token {
                return Err(StoreError::Unauthorized("credential not accepted".into()));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TabularStore for InMemoryStore {
    async fn read_range(&self, token: &AccessToken, range: &Range) -> Result<Vec<Row>> {
        self.begin(token, StoreCall::Read(range.clone())).await?;
        let state = self.state.read().await;
        Ok(read_grid(state.grids.get(&range.table), range))
    }

    async fn append_row(&self, token: &AccessToken, table: Table, row: Row) -> Result<()> {
        self.begin(token, StoreCall::Append(table)).await?;
        let mut state = self.state.write().await;
        let grid = state.grids.entry(table).or_default();
        let at = last_non_empty(grid) + 1;
        write_row(grid, at, 0, row);
        Ok(())
    }

    async fn update_range(&self, token: &AccessToken, range: &Range, rows: Vec<Row>) -> Result<()> {
        self.begin(token, StoreCall::Update(range.clone())).await?;

        let first = range.first_row.unwrap_or(1) as usize;
        if let Some(last) = range.last_row {
            let height = (last as usize + 1).saturating_sub(first);
            if rows.len() > height {
                return Err(StoreError::Server {
                    status: 400,
                    message: format!("{} rows do not fit a range of {}", rows.len(), height),
                });
            }
        }
        let width = range.last_col + 1 - range.first_col;
        if rows.iter().any(|r| r.len() > width) {
            return Err(StoreError::Server {
                status: 400,
                message: format!("row wider than {} columns", width),
            });
        }

        let mut state = self.state.write().await;
        let grid = state.grids.entry(range.table).or_default();
        for (offset, row) in rows.into_iter().enumerate() {
            write_row(grid, first - 1 + offset, range.first_col, row);
        }
        Ok(())
    }

    async fn clear_range(&self, token: &AccessToken, range: &Range) -> Result<()> {
        self.begin(token, StoreCall::Clear(range.clone())).await?;

        let mut state = self.state.write().await;
        {
            let grid = state.grids.entry(range.table).or_default();
            let first = range.first_row.unwrap_or(1) as usize;
            let last = range.last_row.map(|r| r as usize).unwrap_or(grid.len());
            for index in first.saturating_sub(1)..last.min(grid.len()) {
                let row = &mut grid[index];
                for col in range.first_col..=range.last_col {
                    if let Some(cell) = row.get_mut(col) {
                        cell.clear();
                    }
                }
            }
        }

        let pending: Vec<Row> = {
            let (now, later): (Vec<_>, Vec<_>) =
                state.after_clear.drain(..).partition(|(t, _)| *t == range.table);
            state.after_clear = later;
            now.into_iter().map(|(_, row)| row).collect()
        };
        let grid = state.grids.entry(range.table).or_default();
        for row in pending {
            let at = last_non_empty(grid) + 1;
            write_row(grid, at, 0, row);
        }
        Ok(())
    }
}

fn header(cells: &[&str]) -> Row {
    cells.iter().map(|c| c.to_string()).collect()
}

/// Index of the last row holding any non-empty cell, or 0 (the header)
fn last_non_empty(grid: &[Row]) -> usize {
    grid.iter()
        .rposition(|row| row.iter().any(|c| !c.is_empty()))
        .unwrap_or(0)
}

fn write_row(grid: &mut Vec<Row>, index: usize, first_col: usize, cells: Row) {
    while grid.len() <= index {
        grid.push(Vec::new());
    }
    let row = &mut grid[index];
    let needed = first_col + cells.len();
    if row.len() < needed {
        row.resize(needed, String::new());
    }
    for (offset, cell) in cells.into_iter().enumerate() {
        row[first_col + offset] = cell;
    }
}

fn read_grid(grid: Option<&Vec<Row>>, range: &Range) -> Vec<Row> {
    let Some(grid) = grid else {
        return Vec::new();
    };

    let first = range.first_row.unwrap_or(1) as usize;
    let last = range.last_row.map(|r| r as usize).unwrap_or(grid.len()).min(grid.len());

    let mut rows: Vec<Row> = (first..=last)
        .filter_map(|n| grid.get(n - 1))
        .map(|row| {
            let mut cells: Row = (range.first_col..=range.last_col)
                .map(|col| row.get(col).cloned().unwrap_or_default())
                .collect();
            while cells.last().is_some_and(|c| c.is_empty()) {
                cells.pop();
            }
            cells
        })
        .collect();

    while rows.last().is_some_and(|r| r.is_empty()) {
        rows.pop();
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> AccessToken {
        AccessToken::new("t")
    }

    fn row(cells: &[&str]) -> Row {
        header(cells)
    }

    #[tokio::test]
    async fn test_append_and_read_trims_trailing_blanks() {
        let store = InMemoryStore::new();
        store
            .append_row(&token(), Table::Ownership, row(&["C1", "u1", "", "TRUE", ""]))
            .await
            .unwrap();

        let rows = store.read_range(&token(), &Range::data(Table::Ownership)).await.unwrap();
        assert_eq!(rows, vec![row(&["C1", "u1", "", "TRUE"])]);
    }

    #[tokio::test]
    async fn test_clear_then_rewrite_compacts_rows() {
        let store = InMemoryStore::new();
        store
            .seed(
                Table::Ownership,
                vec![row(&["C1", "u1", "TRUE"]), row(&["C2", "u1", "TRUE"]), row(&["C3", "u1", "TRUE"])],
            )
            .await;

        store.clear_range(&token(), &Range::data(Table::Ownership)).await.unwrap();
        assert!(store.rows(Table::Ownership).await.is_empty());

        store
            .update_range(
                &token(),
                &Range::rows(Table::Ownership, 2, 3),
                vec![row(&["C1", "u1", "TRUE"]), row(&["C3", "u1", "TRUE"])],
            )
            .await
            .unwrap();

        let rows = store.rows(Table::Ownership).await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][0], "C3");
    }

    #[tokio::test]
    async fn test_append_goes_after_last_non_empty_row() {
        let store = InMemoryStore::new();
        store.seed(Table::Users, vec![row(&["user1", "Ash", "ash@example.com"])]).await;
        store.clear_range(&token(), &Range::data(Table::Users)).await.unwrap();
        store
            .append_row(&token(), Table::Users, row(&["user2", "Misty", "misty@example.com"]))
            .await
            .unwrap();

        assert_eq!(store.rows(Table::Users).await, vec![row(&["user2", "Misty", "misty@example.com"])]);
    }

    #[tokio::test]
    async fn test_update_single_cell() {
        let store = InMemoryStore::new();
        store.seed(Table::Users, vec![row(&["user1", "Ash", "ash@example.com"])]).await;
        store
            .update_range(&token(), &Range::cell(Table::Users, 1, 2), vec![row(&["Satoshi"])])
            .await
            .unwrap();

        assert_eq!(store.rows(Table::Users).await[0][1], "Satoshi");
    }

    #[tokio::test]
    async fn test_update_rejects_rows_beyond_range() {
        let store = InMemoryStore::new();
        let result = store
            .update_range(&token(), &Range::row(Table::Users, 2), vec![row(&["a"]), row(&["b"])])
            .await;
        assert!(matches!(result, Err(StoreError::Server { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_fault_injection_and_token_check() {
        let store = InMemoryStore::new();
        store.fail_next_transport(1).await;
        assert!(matches!(
            store.read_range(&token(), &Range::data(Table::Users)).await,
            Err(StoreError::Transport(_))
        ));

        store.require_token(Some(AccessToken::new("fresh"))).await;
        let err = store.read_range(&token(), &Range::data(Table::Users)).await.unwrap_err();
        assert!(err.is_unauthorized());
        assert!(store
            .read_range(&AccessToken::new("fresh"), &Range::data(Table::Users))
            .await
            .is_ok());
        assert_eq!(store.calls().await.len(), 3);
    }

    #[tokio::test]
    async fn test_append_after_next_clear_lands_in_window() {
        let store = InMemoryStore::new();
        store.seed(Table::Ownership, vec![row(&["C1", "u1", "TRUE"])]).await;
        store.append_after_next_clear(Table::Ownership, row(&["C9", "u2", "TRUE"])).await;

        store.clear_range(&token(), &Range::data(Table::Ownership)).await.unwrap();
        assert_eq!(store.rows(Table::Ownership).await, vec![row(&["C9", "u2", "TRUE"])]);
    }
}
