//! Range-level store abstraction

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AccessToken, Range, Row, Table};

/// Range-scoped access to the row-oriented store.
///
/// There is no delete-by-key primitive: removing a row means reading the
/// range, clearing it and writing back what should remain. No method retries;
/// retry policy belongs to callers that know what the call means.
#[async_trait]
pub trait TabularStore: Send + Sync {
    /// Read a range. Trailing empty cells and trailing empty rows are dropped.
    async fn read_range(&self, token: &AccessToken, range: &Range) -> Result<Vec<Row>>;

    /// Append a row after the last non-empty row of the table
    async fn append_row(&self, token: &AccessToken, table: Table, row: Row) -> Result<()>;

    /// Overwrite cells starting at the top-left corner of `range`
    async fn update_range(&self, token: &AccessToken, range: &Range, rows: Vec<Row>) -> Result<()>;

    /// Blank every cell inside `range`
    async fn clear_range(&self, token: &AccessToken, range: &Range) -> Result<()>;
}
