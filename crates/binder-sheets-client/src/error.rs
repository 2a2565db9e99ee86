//! Error types for the sheets client

use thiserror::Error;

/// Sheets client error
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport failure (connection, TLS, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The bearer credential was rejected (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Server returned a non-success status other than 401
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid response from server
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Simulated or local transport failure (in-memory store)
    #[error("Transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// True for credential rejections; callers may re-authenticate and retry
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, StoreError::Unauthorized(_))
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
