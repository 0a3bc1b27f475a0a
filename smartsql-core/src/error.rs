//! Error types for smartsql-core.
//!
//! Minimal error types without storage dependencies (no rusqlite).

use thiserror::Error;

/// Smart SQL compilation error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SmartSqlError {
    #[error("Smart SQL must be a read-only query, found '{0}' statement")]
    WriteStatement(String),

    #[error("Malformed soup reference: {0}")]
    MalformedReference(String),

    #[error("Unknown soup: {0}")]
    UnknownSoup(String),

    #[error("Unknown path '{path}' in soup '{soup}'")]
    UnknownPath { soup: String, path: String },

    #[error("Ambiguous reference to '{0}': qualify it with a table name or alias when several soups are queried")]
    AmbiguousBodyReference(String),

    #[error("Page {page_index} of size {page_size} is out of range")]
    PageOutOfRange { page_size: usize, page_index: usize },

    #[error("Resolver error: {0}")]
    Resolver(String),
}

/// Result type for Smart SQL operations
pub type SmartSqlResult<T> = Result<T, SmartSqlError>;

impl serde::Serialize for SmartSqlError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}
