//! Range-scoped client for the spreadsheet that stores the binder tables
//!
//! Three logical tables live in one spreadsheet: catalog items, users and
//! ownership records. This crate only moves rows; it holds no business rules.
//!
//! # Example
//!
//! ```rust,no_run
//! use binder_sheets_client::{AccessToken, Range, SheetsClient, SheetsConfig, Table, TabularStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SheetsClient::new(SheetsConfig {
//!     spreadsheet_id: "1AbC".into(),
//!     ..Default::default()
//! })?;
//! let token = AccessToken::new("ya29...");
//!
//! // Read every ownership row below the header
//! let rows = client.read_range(&token, &Range::data(Table::Ownership)).await?;
//!
//! // Append a row
//! client
//!     .append_row(&token, Table::Ownership, vec!["C1".into(), "user1".into(), String::new(), "TRUE".into()])
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod memory;
pub mod store;
pub mod types;

// Re-export main types
pub use client::SheetsClient;
pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, StoreCall};
pub use store::TabularStore;
pub use types::*;
