//! Title service error types.

use titlesync_core::HolderId;
use titlesync_storage::{ErrorCategory, StorageError};

/// Errors returned by [`crate::TitleService`].
#[derive(Debug, thiserror::Error)]
pub enum TitleError {
    /// The durable store rejected or failed the operation.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The holder already owns the maximum number of titles.
    #[error("title collection of {holder} is full ({max} titles)")]
    CollectionFull { holder: HolderId, max: usize },

    /// The service no longer accepts mutations.
    #[error("title service is shutting down")]
    ShuttingDown,

    /// A spawned mutation task panicked or was cancelled.
    #[error("title task failed: {0}")]
    Task(String),
}

impl TitleError {
    /// Short, non-technical text suitable for showing to the holder.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Storage(_) | Self::Task(_) => {
                "Your titles could not be updated right now. Please try again later."
            }
            Self::CollectionFull { .. } => "Your title collection is full.",
            Self::ShuttingDown => "The title service is restarting. Please try again shortly.",
        }
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Storage failure category, for log fields.
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Storage(e) => Some(e.category()),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for TitleError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TitleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_messages_hide_details() {
        let err = TitleError::from(StorageError::connection_error("tcp reset by peer"));
        assert!(err.is_storage());
        assert!(!err.user_message().contains("tcp"));
        assert!(err.to_string().contains("tcp reset by peer"));

        let full = TitleError::CollectionFull {
            holder: HolderId::random(),
            max: 54,
        };
        assert_eq!(full.user_message(), "Your title collection is full.");
        assert!(full.to_string().contains("54"));
    }

    #[test]
    fn category_is_reported_for_storage_failures_only() {
        let err = TitleError::from(StorageError::query_error("load_titles", "timeout"));
        assert_eq!(err.category(), Some(ErrorCategory::Query));
        assert_eq!(
            TitleError::from(StorageError::connection_error("refused")).category(),
            Some(ErrorCategory::Infrastructure)
        );
        assert_eq!(TitleError::ShuttingDown.category(), None);
    }
}
