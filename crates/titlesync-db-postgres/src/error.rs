//! Error types for the PostgreSQL store.

use sqlx_core::error::Error as SqlxError;
use titlesync_storage::StorageError;

/// Errors specific to the PostgreSQL store.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] SqlxError),

    /// Schema creation error.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => StorageError::connection_error(e.to_string()),
            PostgresError::Schema(e) => StorageError::schema_error(e),
            PostgresError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
        }
    }
}

/// Maps a driver error raised by a store operation.
///
/// Pool and transport failures become connection errors; everything else is
/// attributed to the operation's query.
pub(crate) fn query_error(operation: &'static str, err: SqlxError) -> StorageError {
    match err {
        SqlxError::PoolTimedOut
        | SqlxError::PoolClosed
        | SqlxError::WorkerCrashed
        | SqlxError::Io(_)
        | SqlxError::Tls(_) => StorageError::connection_error(format!("{operation}: {err}")),
        other => StorageError::query_error(operation, other.to_string()),
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
