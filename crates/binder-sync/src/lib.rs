//! Binder Sync - ownership synchronization for a shared card binder
//!
//! Several collectors share one spreadsheet: a read-only catalog of cards, a
//! user table keyed by email, and an ownership table recording which cards
//! each user is missing or willing to trade. Every collector runs their own
//! client; nothing coordinates them except the spreadsheet itself.
//!
//! # Architecture
//!
//! - **Session**: bearer credential lifecycle with reactive expiry handling
//! - **Identity**: binds the signed-in identity to a user row (find-or-create)
//! - **Ownership**: upsert-or-delete toggles over a table with no row deletion
//! - **Cache**: per-user and all-users views merged from confirmed writes
//!
//! # Example
//!
//! ```rust,ignore
//! use binder_sync::{Binder, OwnershipEngineConfig, Session};
//!
//! let mut binder = Binder::new(store, session, OwnershipEngineConfig::default());
//! binder.sign_in(&userinfo).await?;
//!
//! // Confirmed remotely before the local caches change
//! binder.toggle_not_owned("A1-025", true).await?;
//! for warning in binder.take_warnings() {
//!     eprintln!("{}", warning);
//! }
//! ```

// Application state and composition root
pub mod binder;

// Local caches
pub mod cache;

// Catalog reads
pub mod catalog;

// CLI configuration
pub mod config;

// Error types
pub mod error;

// Google OAuth/userinfo adapters
pub mod google;

// User identity resolution
pub mod identity;

// Ownership reconciliation
pub mod ownership;

// Session-bound store access
pub mod remote;

// Credential lifecycle
pub mod session;

// Aggregates
pub mod stats;

pub use binder::Binder;
pub use cache::{LocalCaches, OwnershipCache};
pub use catalog::{CatalogItem, CatalogReader};
pub use error::{ConsistencyWarning, Result, SyncError};
pub use google::{GoogleUserInfo, StaticTokenConsent};
pub use identity::{ExternalIdentity, IdentityProvider, IdentityResolver, Resolved, User};
pub use ownership::{
    OwnershipEngine, OwnershipEngineConfig, OwnershipKey, OwnershipRecord, RowChange, Toggle,
};
pub use remote::AuthorizedStore;
pub use session::{
    ConsentFlow, Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore, Session,
    SessionState,
};
pub use stats::{missing_items, CategoryTally, CollectionStats, ItemDemand};

// Re-export the store layer so callers need only this crate
pub use binder_sheets_client;
