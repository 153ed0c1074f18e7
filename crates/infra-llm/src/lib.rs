// Fabrica LLM Infrastructure
// reqwest-based GenerativeClient adapter for OpenAI-compatible endpoints.

mod http_client;

pub use http_client::{HttpGenerativeClient, HttpGenerativeClientConfig};
