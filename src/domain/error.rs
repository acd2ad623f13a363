use thiserror::Error;

/// Violations of the rules that records must satisfy before they are stored.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("`{field}` is invalid: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("domain invariant violated: {message}")]
    Invariant { message: String },
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    /// Field the error is attached to, if any.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            Self::Invariant { .. } => None,
        }
    }

    /// Message suitable for rendering next to a form field.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message, .. } | Self::Invariant { message } => message,
        }
    }
}
