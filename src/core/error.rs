/// dbkit Error Module
///
/// This module defines the error types shared by the connection adapters and
/// the query profiler. Profiler misuse is kept in its own enum so callers can
/// tell a usage bug apart from a database failure.
use crate::profiler::QueryHandle;
use thiserror::Error;

/// Usage errors raised by the [`Profiler`](crate::profiler::Profiler).
///
/// Both variants signal a bug in the calling code (ending a query twice,
/// asking for an unknown handle). The profiler never retries, logs or
/// swallows them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfilerError {
    /// The handle has no entry in the profiler ledger
    #[error("Profiler has no query with handle '{}'", .handle.map_or_else(|| "none".to_string(), |h| h.to_string()))]
    NotFound { handle: Option<QueryHandle> },

    /// `query_end` was already called for this handle
    #[error("Query with profiler handle '{0}' has already ended")]
    AlreadyEnded(QueryHandle),
}

/// Error type for every fallible dbkit operation.
#[derive(Error, Debug)]
pub enum DbError {
    /// Errors coming straight from SQLite
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed statements; the message carries the offending SQL
    #[error("Query error: {0}")]
    Query(String),

    /// Profiler usage errors, surfaced untranslated
    #[error("Profiler error: {0}")]
    Profiler(#[from] ProfilerError),

    /// Configuration loading and DSN errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection lifecycle errors (no shared instance, failed reconnect)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Transaction-related errors
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Type alias for Result to use DbError as the error type.
pub type Result<T> = std::result::Result<T, DbError>;
