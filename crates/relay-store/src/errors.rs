//! Error types for the message store.

use thiserror::Error;

/// Errors returned by [`MessageStore`](crate::MessageStore) implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which migration failed and why.
        message: String,
    },

    /// A stored row could not be turned back into a message.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The blocking task running a query panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(String),

    /// The backend refused the operation (transient).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
