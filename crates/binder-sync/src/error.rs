//! Error and warning types for binder synchronization

use binder_sheets_client::{Row, StoreError};
use std::fmt;
use thiserror::Error;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Sync error types
#[derive(Error, Debug)]
pub enum SyncError {
    /// Remote store call failed (transport or server). Not retried.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Network error talking to the identity or OAuth endpoints
    #[error("Network error: {0}")]
    Network(String),

    /// Credential could not be obtained or was refused by the identity provider
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Credential rejected again right after re-acquiring it
    #[error("Session expired: credential rejected after re-authentication ({0})")]
    SessionExpired(String),

    /// Operation needs a resolved current user
    #[error("Not signed in")]
    NotSignedIn,

    /// The ownership range was cleared but writing the surviving rows back failed.
    /// `pending` holds the rows that are missing remotely.
    #[error("Ownership rewrite interrupted with {} rows pending: {source}", .pending.len())]
    RewriteInterrupted {
        pending: Vec<Row>,
        #[source]
        source: Box<SyncError>,
    },

    /// Credential persistence failed
    #[error("Credential store error: {0}")]
    Credential(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// True for failures of the transport itself (as opposed to auth or logic errors)
    pub fn is_transport(&self) -> bool {
        match self {
            SyncError::Store(StoreError::Http(_)) | SyncError::Store(StoreError::Transport(_)) => true,
            SyncError::Network(_) => true,
            SyncError::RewriteInterrupted { source, .. } => source.is_transport(),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Credential(err.to_string())
    }
}

/// Soft signal that the remote store may hold a state other clients disagree with.
///
/// Never an error: the store is the source of truth and a full reload shows
/// whatever state won.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsistencyWarning {
    /// Several user rows share one email
    DuplicateUser { email: String, user_ids: Vec<String> },
    /// Several ownership rows share one composite key
    DuplicateOwnership { item_id: String, user_id: String, rows: usize },
    /// The ownership range read back after clear+rewrite differs from what was written
    DeleteWindow { expected_rows: usize, observed_rows: usize },
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateUser { email, user_ids } => {
                write!(f, "duplicate users for {}: {}", email, user_ids.join(", "))
            }
            Self::DuplicateOwnership { item_id, user_id, rows } => {
                write!(f, "{} ownership rows for ({}, {})", rows, item_id, user_id)
            }
            Self::DeleteWindow { expected_rows, observed_rows } => write!(
                f,
                "ownership table changed during rewrite: wrote {} rows, found {}",
                expected_rows, observed_rows
            ),
        }
    }
}
