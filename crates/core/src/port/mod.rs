// Port Layer - Interfaces for external dependencies

pub mod content_cache;
pub mod cost_governor;
pub mod generative_client;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod time_provider;

// Re-exports
pub use content_cache::{CacheLookup, ContentCache};
pub use cost_governor::{Admission, CostGovernor};
pub use generative_client::{GenerateError, GenerateRequest, GenerativeClient};
pub use id_provider::IdProvider;
pub use job_store::JobStore;
pub use time_provider::TimeProvider;
