//! Provider error types.

use thiserror::Error;

/// Errors reported by a data provider.
///
/// Provider errors are `Clone` because a single failed call is delivered to
/// every caller that shared it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Record not found.
    #[error("record not found: {resource}/{id}")]
    NotFound { resource: String, id: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// The backend rejected the call.
    #[error("{message}")]
    Rejected { message: String },

    /// Transport or connection error.
    #[error("provider connection error: {message}")]
    Connection { message: String },

    /// Internal error.
    #[error("internal provider error: {message}")]
    Internal { message: String },
}

impl ProviderError {
    /// Creates a rejection carrying only a message.
    pub fn rejected(message: impl Into<String>) -> Self {
        ProviderError::Rejected {
            message: message.into(),
        }
    }

    /// Returns the user-facing message of this error.
    pub fn message(&self) -> String {
        match self {
            ProviderError::Rejected { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
