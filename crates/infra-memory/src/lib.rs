// Fabrica In-Memory Infrastructure
// Volatile adapters: job state deliberately does not survive a restart.

mod content_cache;
mod governor;
mod job_store;

pub use content_cache::InMemoryContentCache;
pub use governor::{TokenBucketGovernor, UsageTotals};
pub use job_store::InMemoryJobStore;
