//! Error types for bulk write operations

use thiserror::Error;

/// Core error type for pgbulk operations
#[derive(Error, Debug)]
pub enum BulkError {
    /// The call is misconfigured and was rejected before any statement ran.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A statement could not be assembled from the given fields.
    #[error("Builder error: {0}")]
    Builder(String),

    /// The database rejected the statement.
    #[error("Query error: {0}")]
    Query(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("{0}")]
    Other(String),
}

impl BulkError {
    pub(crate) fn unknown_field(table: &str, name: &str) -> Self {
        BulkError::Configuration(format!("table {} has no field named '{}'", table, name))
    }

    /// Whether the error was raised before anything was sent to the database.
    pub fn is_configuration(&self) -> bool {
        matches!(self, BulkError::Configuration(_) | BulkError::Builder(_))
    }
}

/// Result type alias for pgbulk operations
pub type Result<T> = std::result::Result<T, BulkError>;
