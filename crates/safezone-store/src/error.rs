use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (e.g. creating the database directory).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A record the operation depends on does not exist.
    #[error("Record not found")]
    NotFound,

    /// Insert of a record whose key is already taken.
    #[error("Record already exists: {0}")]
    AlreadyExists(String),

    /// A write was rejected because it would break a record invariant.
    #[error("Invalid record: {0}")]
    Invalid(String),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// Binary column encoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// JSON column encoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The shared connection mutex was poisoned by a panicking holder.
    #[error("Database lock poisoned")]
    LockPoisoned,

    /// Watches need a tokio runtime to drive them.
    #[error("No tokio runtime available for watch task")]
    NoRuntime,
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
