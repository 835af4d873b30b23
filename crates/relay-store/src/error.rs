//! Database error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLx error (connection, query, etc.)
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A tenant with this id is already registered.
    #[error("tenant already exists: {id}")]
    DuplicateTenant { id: String },

    /// The live schema could not be inspected or altered.
    #[error("schema unavailable for table {table}: {source}")]
    SchemaUnavailable {
        table: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// The connection string does not select a supported engine.
    #[error("unsupported database url: {0}")]
    UnsupportedUrl(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl DatabaseError {
    pub(crate) fn schema(table: &'static str, source: sqlx::Error) -> Self {
        DatabaseError::SchemaUnavailable { table, source }
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;
