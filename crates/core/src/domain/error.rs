// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid finding state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Short description must be 1-{max} characters, got {len}")]
    ShortDescriptionLength { len: usize, max: usize },

    #[error("Invalid web link '{0}': must be an absolute http(s) URL")]
    InvalidWebLink(String),

    #[error("Maintenance link is required unless the close reason is ERROR")]
    MissingMaintenanceLink,

    #[error("Unknown close reason: {0}")]
    UnknownCloseReason(String),

    #[error("Invalid due date '{0}': expected MM-DD-YYYY")]
    InvalidDueDate(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
