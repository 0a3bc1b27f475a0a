use smartsql_core::SmartSqlError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Soup '{0}' not found")]
    SoupNotFound(String),

    #[error("Entry {1} not found in soup '{0}'")]
    EntryNotFound(String, i64),

    #[error("Invalid soup spec: {0}")]
    InvalidSoupSpec(String),

    #[error("Invalid index spec: {0}")]
    InvalidIndexSpec(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Smart SQL error: {0}")]
    SmartSql(#[from] SmartSqlError),

    // Upsert constraint errors
    #[error("Field '{0}' is not indexed")]
    FieldNotIndexed(String),

    #[error("External id value cannot be empty (path '{0}')")]
    EmptyExternalId(String),

    #[error("External id value is not unique in this soup (path '{0}')")]
    ExternalIdNotUnique(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    SqliteError(String),
}

pub type DbResult<T> = Result<T, DbError>;

impl serde::Serialize for DbError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        DbError::SqliteError(err.to_string())
    }
}
