// HTTP Generative Client (OpenAI-compatible chat completions)
//
// One generation attempt per call; the hard per-attempt timeout lives in
// the reqwest client and surfaces as GenerateError::Timeout so the
// pipeline can retry that attempt without touching the owning job.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fabrica_core::port::{GenerateError, GenerateRequest, GenerativeClient};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct HttpGenerativeClientConfig {
    /// Chat-completions endpoint URL.
    pub endpoint: String,
    pub api_key: Option<String>,
    /// Model name (e.g. "gpt-4o-mini").
    pub model: String,
    /// Hard per-attempt timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for HttpGenerativeClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug)]
pub struct HttpGenerativeClient {
    client: reqwest::Client,
    config: HttpGenerativeClientConfig,
}

impl HttpGenerativeClient {
    /// Build the client. Missing credentials are a configuration error
    /// here, at startup, not at first use.
    pub fn new(config: HttpGenerativeClientConfig) -> Result<Self, GenerateError> {
        if config.api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            return Err(GenerateError::Configuration(
                "missing API key for generative endpoint".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerateError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }
}

// OpenAI-compatible request/response structures

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

fn classify_status(status: StatusCode, body: &str) -> GenerateError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => {
            GenerateError::QuotaExceeded(format!("HTTP 429: {}", body))
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => {
            GenerateError::Configuration(format!("HTTP {}: {}", status, body))
        }
        _ => GenerateError::TransientNetwork(format!("HTTP {}: {}", status, body)),
    }
}

#[async_trait]
impl GenerativeClient for HttpGenerativeClient {
    async fn generate(&self, request: GenerateRequest) -> Result<String, GenerateError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.config.api_key {
            let value = format!("Bearer {}", key);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&value)
                    .map_err(|e| GenerateError::Configuration(e.to_string()))?,
            );
        }

        let user_content = format!("{}\n\n{}", request.content, request.schema_hint);
        let body = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.instructions,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_content,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        };

        debug!(
            model = %self.config.model,
            max_tokens = request.max_output_tokens,
            temperature = request.temperature,
            "dispatching generation request"
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerateError::Timeout((self.config.timeout_secs * 1000) as i64)
                } else {
                    GenerateError::TransientNetwork(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &text));
        }

        let text = response
            .text()
            .await
            .map_err(|e| GenerateError::TransientNetwork(e.to_string()))?;

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| GenerateError::TransientNetwork(format!("bad response body: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                GenerateError::TransientNetwork("no choices in upstream response".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_key_is_a_configuration_error_at_construction() {
        let err = HttpGenerativeClient::new(HttpGenerativeClientConfig::default()).unwrap_err();
        assert!(matches!(err, GenerateError::Configuration(_)));

        let err = HttpGenerativeClient::new(HttpGenerativeClientConfig {
            api_key: Some("   ".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, GenerateError::Configuration(_)));
    }

    #[test]
    fn valid_key_builds_a_client() {
        let client = HttpGenerativeClient::new(HttpGenerativeClientConfig {
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        });
        assert!(client.is_ok());
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "slow down"),
            GenerateError::QuotaExceeded(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, "bad key"),
            GenerateError::Configuration(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "upstream sad"),
            GenerateError::TransientNetwork(_)
        ));
    }
}
