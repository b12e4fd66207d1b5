//! Error types for keyrelay core.

use thiserror::Error;

/// Errors raised while interpreting client-supplied encodings.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid base64 in {field}: {reason}")]
    Base64 { field: &'static str, reason: String },
}

/// Validation errors for request fields. Always the client's fault.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} field can not be empty")]
    MissingField(&'static str),

    #[error("quantity must be between 1 and {max}, got {got}")]
    QuantityOutOfRange { got: i64, max: usize },

    #[error("malformed request body: {0}")]
    MalformedBody(String),
}
