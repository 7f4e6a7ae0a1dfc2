//! Error types for campus data validation

use thiserror::Error;

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: &'static str },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Unread count {unread} exceeds total {total}")]
    UnreadExceedsTotal { unread: u64, total: u64 },
}

impl ValidationError {
    /// Message shown to the user when a form fails validation.
    pub fn user_message(&self) -> String {
        match self {
            ValidationError::RequiredFieldMissing { field: "display_name" } => {
                "Please enter your name".to_string()
            }
            ValidationError::RequiredFieldMissing { .. } => "Please fill in all fields".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;
