//! # Infrastructure Errors
//!
//! Synchronous failures returned to the caller of the orchestrator.
//! Asynchronous provisioning failures never surface here; they are recorded
//! as `failed` on the affected service.

use crate::parser::ParseError;
use crate::provider::ProviderError;
use crate::repository::RepositoryError;
use crate::template::TemplateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfrastructureError {
    /// Malformed document
    #[error("invalid service document: {0}")]
    Structural(String),
    /// Well-formed but semantically invalid document
    #[error("validation failed for {field}: {message}")]
    Validation { field: String, message: String },
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// Caller lacks the required role
    #[error("not authorized: {0}")]
    Authorization(String),
    #[error("{0} not found")]
    NotFound(String),
    /// Repository failure while reading or writing records
    #[error("persistence error: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("too many provisioning requests, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    /// Synchronous call to an external adapter failed
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl InfrastructureError {
    /// True when the caller can fix the request; false for backend failures
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            InfrastructureError::Persistence(_) | InfrastructureError::Provider(_)
        )
    }
}

impl From<ParseError> for InfrastructureError {
    fn from(e: ParseError) -> Self {
        match e {
            ParseError::Structural(message) => InfrastructureError::Structural(message),
            ParseError::Validation { field, message } => {
                InfrastructureError::Validation { field, message }
            }
        }
    }
}
