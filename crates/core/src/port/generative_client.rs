// Generative Service Port
// Abstraction over the external text-generation endpoint. The returned text
// carries NO guarantee of being syntactically valid against the requested
// contract; the invocation pipeline owns parsing and validation.

use async_trait::async_trait;
use thiserror::Error;

/// One upstream generation attempt.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// System-level instructions (role, tone, rules).
    pub instructions: String,
    /// User content the generation is about.
    pub content: String,
    /// Rendered description of the output contract, appended to the prompt.
    pub schema_hint: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

/// Client-level errors, classified for the retry driver.
#[derive(Error, Debug, Clone)]
pub enum GenerateError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("upstream call timed out after {0}ms")]
    Timeout(i64),

    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Missing credentials, bad endpoint, rejected request shape. Fatal,
    /// never retried.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Generative client trait
///
/// Implementations:
/// - HttpGenerativeClient (infra-llm): OpenAI-compatible chat endpoint
/// - mocks::ScriptedClient: canned replies for tests
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Run one generation attempt and return the raw response text.
    async fn generate(&self, request: GenerateRequest) -> Result<String, GenerateError>;
}

#[async_trait]
impl GenerativeClient for std::sync::Arc<dyn GenerativeClient> {
    async fn generate(&self, request: GenerateRequest) -> Result<String, GenerateError> {
        (**self).generate(request).await
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// One scripted reply.
    #[derive(Debug, Clone)]
    pub enum Reply {
        Text(String),
        Fail(GenerateError),
    }

    /// Scripted client: replays a fixed sequence of replies, repeating the
    /// last one once the script runs out. Counts calls so tests can assert
    /// how many upstream attempts were actually made.
    pub struct ScriptedClient {
        script: Mutex<Vec<Reply>>,
        cursor: AtomicUsize,
        call_count: AtomicUsize,
    }

    impl ScriptedClient {
        pub fn new(script: Vec<Reply>) -> Self {
            assert!(!script.is_empty(), "script must have at least one reply");
            Self {
                script: Mutex::new(script),
                cursor: AtomicUsize::new(0),
                call_count: AtomicUsize::new(0),
            }
        }

        /// Always return the same text.
        pub fn always(text: impl Into<String>) -> Self {
            Self::new(vec![Reply::Text(text.into())])
        }

        /// Always fail with the same error.
        pub fn always_fail(error: GenerateError) -> Self {
            Self::new(vec![Reply::Fail(error)])
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerativeClient for ScriptedClient {
        async fn generate(&self, _request: GenerateRequest) -> Result<String, GenerateError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            let script = self.script.lock().unwrap();
            let index = self
                .cursor
                .fetch_add(1, Ordering::SeqCst)
                .min(script.len() - 1);
            match &script[index] {
                Reply::Text(text) => Ok(text.clone()),
                Reply::Fail(error) => Err(error.clone()),
            }
        }
    }
}
