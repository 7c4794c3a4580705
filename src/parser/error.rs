//! # Parse Errors
//!
//! Structural and validation failures raised before anything is persisted.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    /// The document is not well-formed structured data
    #[error("invalid service document: {0}")]
    Structural(String),
    /// The document is well-formed but semantically invalid
    #[error("{field}: {message}")]
    Validation { field: String, message: String },
}

impl ParseError {
    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        ParseError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// True for structural (syntax) failures
    pub fn is_structural(&self) -> bool {
        matches!(self, ParseError::Structural(_))
    }
}

impl From<serde_yaml::Error> for ParseError {
    fn from(e: serde_yaml::Error) -> Self {
        ParseError::Structural(e.to_string())
    }
}
