use thiserror::Error;

/// Core error types for titlesync domain values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid holder id: {0}")]
    InvalidHolder(String),

    #[error("Invalid invalidation message: {0}")]
    InvalidMessage(String),
}

impl CoreError {
    /// Create a new InvalidHolder error
    pub fn invalid_holder(holder: impl Into<String>) -> Self {
        Self::InvalidHolder(holder.into())
    }

    /// Create a new InvalidMessage error
    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::InvalidMessage(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
