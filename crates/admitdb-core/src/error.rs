//! Error Types

use thiserror::Error;

/// Result type alias for store and domain operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Domain and storage errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// Document not found
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Illegal order status transition
    #[error("Invalid order transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Input rejected by a domain rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// Document with the same id already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backend storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { kind, .. } => format!("{kind} not found."),
            Self::Validation(msg) | Self::Conflict(msg) => msg.clone(),
            Self::InvalidTransition { .. } => "This order has already been settled.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_hide_infrastructure_errors() {
        assert_eq!(CoreError::not_found("User", "uid_1").user_message(), "User not found.");
        assert_eq!(CoreError::Conflict("taken".into()).user_message(), "taken");

        let storage = CoreError::Storage("connection reset".into());
        assert!(storage.is_retryable());
        assert_eq!(storage.user_message(), "An unexpected error occurred.");

        let json: CoreError = serde_json::from_str::<u8>("x").unwrap_err().into();
        assert!(!json.is_retryable());
        assert_eq!(json.user_message(), "An unexpected error occurred.");
    }
}
