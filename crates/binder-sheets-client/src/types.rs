//! Types for the spreadsheet values API

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single spreadsheet row. Trailing empty cells are not guaranteed to be present.
pub type Row = Vec<String>;

/// Client configuration
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    /// Base URL of the Sheets API (without the `/v4` suffix)
    pub base_url: String,
    /// Spreadsheet holding the three tables
    pub spreadsheet_id: String,
    /// Sheet names for each logical table
    pub sheet_names: SheetNames,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sheets.googleapis.com".to_string(),
            spreadsheet_id: String::new(),
            sheet_names: SheetNames::default(),
            timeout_secs: 30,
        }
    }
}

/// Sheet (tab) name for each logical table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetNames {
    pub items: String,
    pub users: String,
    pub ownership: String,
}

impl Default for SheetNames {
    fn default() -> Self {
        Self {
            items: "Cards".to_string(),
            users: "Users".to_string(),
            ownership: "Ownership".to_string(),
        }
    }
}

impl SheetNames {
    pub fn name_of(&self, table: Table) -> &str {
        match table {
            Table::Items => &self.items,
            Table::Users => &self.users,
            Table::Ownership => &self.ownership,
        }
    }
}

/// The three logical tables. Row 1 of each is a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    /// Catalog items: id, number, name, category, group, imageRef
    Items,
    /// Users: id, displayName, email
    Users,
    /// Ownership: itemId, userId, notOwnedFlag, tradeableFlag, notes
    Ownership,
}

impl Table {
    /// Number of columns the table spans
    pub fn width(self) -> usize {
        match self {
            Table::Items => 6,
            Table::Users => 3,
            Table::Ownership => 5,
        }
    }

    /// First row holding data (row 1 is the header)
    pub const FIRST_DATA_ROW: u32 = 2;
}

/// A rectangular range inside one table.
///
/// Rows are 1-based like the sheet itself, columns are 0-based.
/// `first_row == None` means whole columns (`A:E`), `last_row == None`
/// means the range runs to the end of the sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub table: Table,
    pub first_row: Option<u32>,
    pub last_row: Option<u32>,
    pub first_col: usize,
    pub last_col: usize,
}

impl Range {
    /// Every data row of the table (`Ownership!A2:E`)
    pub fn data(table: Table) -> Self {
        Self {
            table,
            first_row: Some(Table::FIRST_DATA_ROW),
            last_row: None,
            first_col: 0,
            last_col: table.width() - 1,
        }
    }

    /// Whole columns of the table (`Ownership!A:E`); the target of appends
    pub fn columns(table: Table) -> Self {
        Self {
            table,
            first_row: None,
            last_row: None,
            first_col: 0,
            last_col: table.width() - 1,
        }
    }

    /// Full-width rows `first..=last`
    pub fn rows(table: Table, first: u32, last: u32) -> Self {
        Self {
            table,
            first_row: Some(first),
            last_row: Some(last),
            first_col: 0,
            last_col: table.width() - 1,
        }
    }

    /// A single full-width row
    pub fn row(table: Table, row: u32) -> Self {
        Self::rows(table, row, row)
    }

    /// A single cell
    pub fn cell(table: Table, col: usize, row: u32) -> Self {
        Self {
            table,
            first_row: Some(row),
            last_row: Some(row),
            first_col: col,
            last_col: col,
        }
    }

    pub fn is_single_cell(&self) -> bool {
        self.first_col == self.last_col
            && self.first_row.is_some()
            && self.first_row == self.last_row
    }

    /// Render in A1 notation against the given sheet name
    pub fn to_a1(&self, sheet: &str) -> String {
        let sheet = quote_sheet_name(sheet);
        let first_col = column_letter(self.first_col);
        let last_col = column_letter(self.last_col);

        if self.is_single_cell() {
            if let Some(row) = self.first_row {
                return format!("{}!{}{}", sheet, first_col, row);
            }
        }

        let start = match self.first_row {
            Some(row) => format!("{}{}", first_col, row),
            None => first_col,
        };
        let end = match (self.first_row, self.last_row) {
            (Some(_), Some(row)) => format!("{}{}", last_col, row),
            _ => last_col,
        };
        format!("{}!{}:{}", sheet, start, end)
    }
}

/// Sheet names other than plain alphanumerics and `_` must be single-quoted,
/// with embedded quotes doubled
fn quote_sheet_name(sheet: &str) -> String {
    if !sheet.is_empty() && sheet.chars().all(|c| c.is_alphanumeric() || c == '_') {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}

/// Spreadsheet column letter for a 0-based index (0 -> A, 25 -> Z, 26 -> AA)
pub fn column_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push((b'A' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Bearer credential presented on every request
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Body of `values.get` responses and `values.update` requests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major_dimension: Option<String>,
    /// Absent when the range holds no values
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

impl ValueRange {
    /// Rows as strings. Non-string cells (numbers, booleans) are stringified.
    pub fn into_rows(self) -> Vec<Row> {
        self.values
            .into_iter()
            .map(|row| row.into_iter().map(cell_to_string).collect())
            .collect()
    }
}

fn cell_to_string(cell: serde_json::Value) -> String {
    match cell {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        serde_json::Value::Bool(true) => "TRUE".to_string(),
        serde_json::Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}

/// Response from `values.append`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendValuesResponse {
    #[serde(default)]
    pub table_range: Option<String>,
    #[serde(default)]
    pub updates: Option<UpdateValuesResponse>,
}

/// Response from `values.update`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateValuesResponse {
    #[serde(default)]
    pub updated_range: Option<String>,
    #[serde(default)]
    pub updated_rows: Option<u32>,
    #[serde(default)]
    pub updated_cells: Option<u32>,
}

/// Response from `values.clear`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearValuesResponse {
    #[serde(default)]
    pub cleared_range: Option<String>,
}

/// Error envelope returned by Google APIs
#[derive(Debug, Deserialize)]
pub struct ApiErrorEnvelope {
    pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
}
