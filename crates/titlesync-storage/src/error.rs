//! Storage error types for the durable store contract.

use std::fmt;

/// Errors that can occur during durable store operations.
///
/// A missing holder is never an error: reads return an empty collection or
/// no selection instead.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// A query was rejected or failed while executing.
    #[error("Query error during {operation}: {message}")]
    QueryError {
        /// Store operation that failed, e.g. `upsert_title`.
        operation: &'static str,
        /// Description of the failure.
        message: String,
    },

    /// Schema creation or verification failed.
    #[error("Schema error: {message}")]
    SchemaError {
        /// Description of the schema error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `QueryError` error.
    #[must_use]
    pub fn query_error(operation: &'static str, message: impl Into<String>) -> Self {
        Self::QueryError {
            operation,
            message: message.into(),
        }
    }

    /// Creates a new `SchemaError` error.
    #[must_use]
    pub fn schema_error(message: impl Into<String>) -> Self {
        Self::SchemaError {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the backend could not be reached.
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionError { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConnectionError { .. } => ErrorCategory::Infrastructure,
            Self::QueryError { .. } => ErrorCategory::Query,
            Self::SchemaError { .. } => ErrorCategory::Schema,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Infrastructure/connection error.
    Infrastructure,
    /// Query execution error.
    Query,
    /// Schema management error.
    Schema,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Query => write!(f, "query"),
            Self::Schema => write!(f, "schema"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::query_error("delete_title", "relation does not exist");
        assert_eq!(
            err.to_string(),
            "Query error during delete_title: relation does not exist"
        );

        let err = StorageError::connection_error("refused");
        assert_eq!(err.to_string(), "Connection error: refused");
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::connection_error("x").category(),
            ErrorCategory::Infrastructure
        );
        assert_eq!(
            StorageError::schema_error("x").category(),
            ErrorCategory::Schema
        );
        assert_eq!(ErrorCategory::Query.to_string(), "query");
        assert!(StorageError::connection_error("x").is_connection_error());
        assert!(!StorageError::internal("x").is_connection_error());
    }
}
