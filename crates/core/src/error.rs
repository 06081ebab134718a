// Central Error Type for the Application

use crate::port::GraphError;
use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Input that must be present before any remote work starts
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: GraphError,
    },

    /// A batch stopped at `index`; the first `committed` entities keep their new state
    #[error("Batch aborted at entity #{index} ({entity_id}) after {committed} committed: {source}")]
    BatchAborted {
        index: usize,
        entity_id: String,
        committed: usize,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    /// Precondition and configuration failures abort before any remote call
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            AppError::Config(_) | AppError::Precondition(_) | AppError::Domain(_)
        )
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
