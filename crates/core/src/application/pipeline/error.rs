// Invocation Error Taxonomy
//
// Every pipeline attempt returns Result<_, InvokeError>; the retry driver
// is an explicit bounded loop inspecting the classification, never
// implicit error propagation.

use thiserror::Error;

use crate::port::GenerateError;

#[derive(Error, Debug, Clone)]
pub enum InvokeError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("upstream call timed out after {0}ms")]
    Timeout(i64),

    /// Raw response could not be parsed into a JSON body.
    #[error("malformed output: {0}")]
    MalformedOutput(String),

    /// Parsed, but the object violates the resolved schema.
    #[error("schema validation failed: {}", .0.join("; "))]
    SchemaValidation(Vec<String>),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Job was cancelled before the pipeline ran. Set by the job layer.
    #[error("cancelled")]
    Cancelled,
}

impl InvokeError {
    /// Whether the in-pipeline retry loop may take another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InvokeError::TransientNetwork(_)
                | InvokeError::Timeout(_)
                | InvokeError::MalformedOutput(_)
                | InvokeError::SchemaValidation(_)
        )
    }

    /// Stable kind tag carried into the job-level error object.
    pub fn kind(&self) -> &'static str {
        match self {
            InvokeError::TransientNetwork(_) => "transient_network",
            InvokeError::Timeout(_) => "timeout",
            InvokeError::MalformedOutput(_) => "malformed_output",
            InvokeError::SchemaValidation(_) => "schema_validation",
            InvokeError::QuotaExceeded(_) => "quota_exceeded",
            InvokeError::Configuration(_) => "configuration",
            InvokeError::Cancelled => "cancelled",
        }
    }
}

impl From<GenerateError> for InvokeError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::TransientNetwork(msg) => InvokeError::TransientNetwork(msg),
            GenerateError::Timeout(ms) => InvokeError::Timeout(ms),
            GenerateError::QuotaExceeded(msg) => InvokeError::QuotaExceeded(msg),
            GenerateError::Configuration(msg) => InvokeError::Configuration(msg),
        }
    }
}

impl From<crate::domain::DomainError> for InvokeError {
    fn from(err: crate::domain::DomainError) -> Self {
        InvokeError::Configuration(err.to_string())
    }
}
