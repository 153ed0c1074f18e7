// Domain Layer - Entities and pure rules

pub mod error;
pub mod job;
pub mod schema;

pub use error::DomainError;
pub use job::{
    Job, JobError, JobId, JobOptions, JobProgress, JobSnapshot, JobStatus, JobType, ReportedStatus,
};
pub use schema::{FieldSpec, FieldType, SchemaDefinition, ValidationResult};
