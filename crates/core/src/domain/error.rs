// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Unknown job type: {0}")]
    UnknownJobType(String),

    #[error("Schema not found: {0}")]
    SchemaNotFound(String),

    #[error("Schema fragment cycle through: {0}")]
    FragmentCycle(String),

    #[error("Retry budget exhausted: {retry_count}/{max_retries}")]
    RetriesExhausted { retry_count: i32, max_retries: i32 },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
