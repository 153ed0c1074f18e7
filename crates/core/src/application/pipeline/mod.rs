// Resilient Invocation Pipeline
//
// Wraps every upstream generation call with: cache lookup, schema
// resolution, per-schema token budget, defensive parsing, validation,
// bounded retry with exponential backoff + jitter, and a final
// deterministic repair pass. Retry state is explicit: each attempt returns
// a classified Result and the driver is a bounded loop, not exception
// control flow.

mod error;
pub mod parse;
pub mod repair;

pub use error::InvokeError;

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::application::schema_registry::{SchemaOptions, SchemaRegistry};
use crate::domain::schema::{FieldSpec, FieldType, SchemaDefinition};
use crate::port::{CacheLookup, ContentCache, CostGovernor, GenerateRequest, GenerativeClient};

/// Retry/backoff policy and cache knobs. A configuration surface, not
/// per-call constants.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Extra attempts after the first (so 2 means up to 3 upstream calls).
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_factor: f64,
    /// Fractional jitter applied to each delay (0.1 = +/-10%).
    pub jitter: f64,
    /// Token-budget growth applied after a truncation-shaped fault.
    pub widen_factor: f64,
    pub cache_enabled: bool,
    pub cache_ttl_ms: i64,
    pub similarity_threshold: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 500,
            backoff_factor: 2.0,
            jitter: 0.1,
            widen_factor: 1.5,
            cache_enabled: true,
            cache_ttl_ms: 6 * 60 * 60 * 1000,
            similarity_threshold: 0.85,
        }
    }
}

/// Per-invocation options.
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    /// Schema adjustments (field inclusion, enum restriction, item caps).
    pub schema: SchemaOptions,
    /// Cache/usage partition; defaults to the schema name.
    pub request_class: Option<String>,
    pub bypass_cache: bool,
    /// Whether a similarity match may satisfy this request class.
    pub allow_fuzzy: bool,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            schema: SchemaOptions::default(),
            request_class: None,
            bypass_cache: false,
            allow_fuzzy: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub instructions: String,
    pub content: String,
    pub schema_name: String,
    pub options: InvokeOptions,
}

/// Successful invocation result. `repaired` marks output that satisfied the
/// schema only after the deterministic repair pass.
#[derive(Debug, Clone)]
pub struct InvokeOutcome {
    pub value: Value,
    pub repaired: bool,
    /// Upstream calls actually made (0 on a cache hit).
    pub attempts: u32,
    pub from_cache: bool,
}

/// One failed attempt, with enough context for the driver to decide.
struct AttemptFault {
    error: InvokeError,
    /// Raw response text, kept for the repair pass.
    raw: Option<String>,
    /// Unbalanced-JSON faults are the truncation signature and trigger
    /// budget widening.
    truncated: bool,
}

pub struct InvocationPipeline {
    registry: Arc<SchemaRegistry>,
    client: Arc<dyn GenerativeClient>,
    cache: Arc<dyn ContentCache>,
    governor: Arc<dyn CostGovernor>,
    config: PipelineConfig,
}

impl InvocationPipeline {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        client: Arc<dyn GenerativeClient>,
        cache: Arc<dyn ContentCache>,
        governor: Arc<dyn CostGovernor>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            registry,
            client,
            cache,
            governor,
            config,
        }
    }

    /// Run the full pipeline for one request.
    pub async fn invoke(&self, request: InvokeRequest) -> Result<InvokeOutcome, InvokeError> {
        let class = request
            .options
            .request_class
            .clone()
            .unwrap_or_else(|| request.schema_name.clone());
        let normalized = normalize_content(&request.instructions, &request.content);

        // 1. Cache lookup: a hit short-circuits with zero upstream calls.
        if self.config.cache_enabled && !request.options.bypass_cache {
            let lookup = CacheLookup {
                request_class: class.clone(),
                normalized_content: normalized.clone(),
                allow_fuzzy: request.options.allow_fuzzy,
                similarity_threshold: self.config.similarity_threshold,
            };
            if let Some(value) = self.cache.get(&lookup).await {
                debug!(request_class = %class, "cache hit, skipping upstream call");
                self.governor.record_usage(&class, 0, 0, true).await;
                return Ok(InvokeOutcome {
                    value,
                    repaired: false,
                    attempts: 0,
                    from_cache: true,
                });
            }
        }

        // 2. Resolve the target schema with per-request options applied.
        let definition = self
            .registry
            .create_schema(&request.schema_name, &request.options.schema)?;
        let budget = self.registry.get(&request.schema_name)?.budget;
        let schema_hint = render_contract(&definition);

        // 3-6. Bounded attempt loop with backoff and budget widening.
        let mut max_tokens = budget.max_output_tokens;
        let mut last_fault: Option<AttemptFault> = None;
        let total_attempts = self.config.max_retries + 1;

        for attempt in 0..total_attempts {
            if attempt > 0 {
                let delay_ms = self.backoff_delay_ms(attempt);
                debug!(attempt, delay_ms, schema = %request.schema_name, "backing off before retry");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                if last_fault.as_ref().is_some_and(|f| f.truncated) {
                    max_tokens = (max_tokens as f64 * self.config.widen_factor) as u32;
                    debug!(max_tokens, "widened token budget after truncation");
                }
            }

            match self
                .attempt(&request, &definition, &schema_hint, max_tokens, budget.temperature, &class)
                .await
            {
                Ok(value) => {
                    self.write_through(&class, &normalized, &value).await;
                    return Ok(InvokeOutcome {
                        value,
                        repaired: false,
                        attempts: attempt + 1,
                        from_cache: false,
                    });
                }
                Err(fault) => {
                    if !fault.error.is_retryable() {
                        return Err(fault.error);
                    }
                    warn!(
                        attempt,
                        schema = %request.schema_name,
                        error = %fault.error,
                        "invocation attempt failed"
                    );
                    // Keep the most recent raw text for the repair pass.
                    if fault.raw.is_some() || last_fault.is_none() {
                        last_fault = Some(fault);
                    } else if let Some(existing) = last_fault.as_mut() {
                        existing.error = fault.error;
                        existing.truncated = fault.truncated;
                    }
                }
            }
        }

        let fault = last_fault.expect("at least one attempt ran");

        // 7. Deterministic repair pass over the last raw response.
        if let Some(raw) = fault.raw.as_deref() {
            let parsed = parse::extract_json(raw).ok();
            if let Some(value) = repair::repair_response(parsed, raw, &definition) {
                info!(
                    schema = %request.schema_name,
                    "response repaired after retry budget exhausted"
                );
                self.write_through(&class, &normalized, &value).await;
                return Ok(InvokeOutcome {
                    value,
                    repaired: true,
                    attempts: total_attempts,
                    from_cache: false,
                });
            }
        }

        // 8. Classified, non-retryable failure back to the caller.
        Err(fault.error)
    }

    /// One upstream call: generate, account usage, parse, validate.
    async fn attempt(
        &self,
        request: &InvokeRequest,
        definition: &SchemaDefinition,
        schema_hint: &str,
        max_output_tokens: u32,
        temperature: f32,
        class: &str,
    ) -> Result<Value, AttemptFault> {
        let generate = GenerateRequest {
            instructions: request.instructions.clone(),
            content: request.content.clone(),
            schema_hint: schema_hint.to_string(),
            max_output_tokens,
            temperature,
        };

        let tokens_in = estimate_tokens(&request.instructions) + estimate_tokens(&request.content);
        let raw = self.client.generate(generate).await.map_err(|e| AttemptFault {
            error: InvokeError::from(e),
            raw: None,
            truncated: false,
        })?;
        self.governor
            .record_usage(class, tokens_in, estimate_tokens(&raw), false)
            .await;

        let parsed = parse::extract_json(&raw).map_err(|fault| AttemptFault {
            error: InvokeError::MalformedOutput(fault.message()),
            truncated: fault.is_truncation(),
            raw: Some(raw.clone()),
        })?;

        let result = definition.validate(&parsed);
        if !result.is_valid {
            return Err(AttemptFault {
                error: InvokeError::SchemaValidation(result.errors),
                raw: Some(raw),
                truncated: false,
            });
        }
        Ok(parsed)
    }

    async fn write_through(&self, class: &str, normalized: &str, value: &Value) {
        if self.config.cache_enabled {
            self.cache
                .set(class, normalized, value.clone(), self.config.cache_ttl_ms)
                .await;
        }
    }

    /// delay = base * factor^(attempt-1), with +/-jitter.
    fn backoff_delay_ms(&self, attempt: u32) -> u64 {
        let base = self.config.base_delay_ms as f64
            * self.config.backoff_factor.powi(attempt as i32 - 1);
        let jitter = rand::thread_rng().gen_range(-self.config.jitter..=self.config.jitter);
        (base * (1.0 + jitter)).max(0.0) as u64
    }
}

/// Normalized request content used for fingerprinting: case-folded with
/// whitespace runs collapsed, instructions and content joined.
pub fn normalize_content(instructions: &str, content: &str) -> String {
    let joined = format!("{}\n{}", instructions, content);
    joined
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Rough 4-chars-per-token estimate for usage accounting.
fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64 / 4).max(1)
}

/// Render the contract as prompt text the model can follow.
fn render_contract(definition: &SchemaDefinition) -> String {
    let mut out = String::from("Return ONLY one valid JSON body with this shape:\n");
    render_spec(&mut out, &definition.root, "", 0);
    out.push_str("No prose, no markdown fences.\n");
    out
}

fn render_spec(out: &mut String, spec: &FieldSpec, name: &str, depth: usize) {
    use std::fmt::Write;

    let indent = "  ".repeat(depth);
    let requirement = if spec.required { "required" } else { "optional" };
    match &spec.field_type {
        FieldType::Object(fields) => {
            if !name.is_empty() {
                let _ = writeln!(out, "{}- {} (object, {}):", indent, name, requirement);
            }
            for (field, child) in fields {
                render_spec(out, child, field, depth + 1);
            }
        }
        FieldType::Array(item) => {
            let mut bounds = format!("at least {}", spec.min_items);
            if let Some(max_items) = spec.max_items {
                let _ = write!(bounds, ", at most {}", max_items);
            }
            let _ = writeln!(
                out,
                "{}- {} (array, {}, {} items):",
                indent, name, requirement, bounds
            );
            render_spec(out, item, "items", depth + 1);
        }
        FieldType::String => {
            let _ = writeln!(out, "{}- {} (string, {})", indent, name, requirement);
        }
        FieldType::Number => {
            let _ = writeln!(out, "{}- {} (number, {})", indent, name, requirement);
        }
        FieldType::Boolean => {
            let _ = writeln!(out, "{}- {} (boolean, {})", indent, name, requirement);
        }
        FieldType::Enum(members) => {
            let _ = writeln!(
                out,
                "{}- {} (one of: {}, {})",
                indent,
                name,
                members.join(" | "),
                requirement
            );
        }
        FieldType::Fragment(fragment) => {
            let _ = writeln!(out, "{}- {} (see {}, {})", indent, name, fragment, requirement);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::catalog::register_builtin_schemas;
    use crate::port::cost_governor::mocks::AllowAllGovernor;
    use crate::port::content_cache::mocks::NullCache;
    use crate::port::generative_client::mocks::{Reply, ScriptedClient};
    use crate::port::GenerateError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn fast_config() -> PipelineConfig {
        PipelineConfig {
            base_delay_ms: 1,
            ..Default::default()
        }
    }

    fn registry() -> Arc<SchemaRegistry> {
        let registry = SchemaRegistry::new();
        register_builtin_schemas(&registry).unwrap();
        Arc::new(registry)
    }

    fn pipeline_with(client: Arc<ScriptedClient>, config: PipelineConfig) -> InvocationPipeline {
        InvocationPipeline::new(
            registry(),
            client,
            Arc::new(NullCache),
            Arc::new(AllowAllGovernor),
            config,
        )
    }

    fn outline_request() -> InvokeRequest {
        InvokeRequest {
            instructions: "You are a curriculum designer.".into(),
            content: "Topic: Learn Rust".into(),
            schema_name: "outline".into(),
            options: InvokeOptions::default(),
        }
    }

    fn valid_outline() -> String {
        json!({
            "title": "Learn Rust",
            "overview": "A practical path.",
            "sections": [{"heading": "Ownership"}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn clean_response_succeeds_first_attempt() {
        let client = Arc::new(ScriptedClient::always(valid_outline()));
        let pipeline = pipeline_with(client.clone(), fast_config());

        let outcome = pipeline.invoke(outline_request()).await.unwrap();
        assert!(!outcome.repaired);
        assert!(!outcome.from_cache);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn transient_fault_is_retried() {
        let client = Arc::new(ScriptedClient::new(vec![
            Reply::Fail(GenerateError::TransientNetwork("connection reset".into())),
            Reply::Text(valid_outline()),
        ]));
        let pipeline = pipeline_with(client.clone(), fast_config());

        let outcome = pipeline.invoke(outline_request()).await.unwrap();
        assert_eq!(outcome.attempts, 2);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn malformed_then_valid_recovers_without_repair() {
        let client = Arc::new(ScriptedClient::new(vec![
            Reply::Text("I'd be happy to help! But no JSON today.".into()),
            Reply::Text(format!("```json\n{}\n```", valid_outline())),
        ]));
        let pipeline = pipeline_with(client.clone(), fast_config());

        let outcome = pipeline.invoke(outline_request()).await.unwrap();
        assert!(!outcome.repaired);
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn fatal_error_is_not_retried() {
        let client = Arc::new(ScriptedClient::always_fail(GenerateError::QuotaExceeded(
            "monthly budget".into(),
        )));
        let pipeline = pipeline_with(client.clone(), fast_config());

        let err = pipeline.invoke(outline_request()).await.unwrap_err();
        assert!(matches!(err, InvokeError::QuotaExceeded(_)));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn truncated_list_is_repaired_into_partial_result() {
        // Every attempt returns the same truncated flashcards body.
        let truncated = r#"{"topic": "Rust", "cards": [
            {"front": "Q1", "back": "A1", "difficulty": "core"},
            {"front": "Q2", "back": "A2", "difficulty": "intro"},
            {"front": "Q3"#;
        let client = Arc::new(ScriptedClient::always(truncated));
        let pipeline = pipeline_with(client.clone(), fast_config());

        let outcome = pipeline
            .invoke(InvokeRequest {
                instructions: "Make flashcards.".into(),
                content: "Topic: Rust".into(),
                schema_name: "flashcards".into(),
                options: InvokeOptions::default(),
            })
            .await
            .unwrap();

        assert!(outcome.repaired);
        assert_eq!(client.call_count(), 3); // initial + 2 retries
        let cards = outcome.value["cards"].as_array().unwrap();
        assert_eq!(cards.len(), 2);
    }

    #[tokio::test]
    async fn missing_required_field_is_never_reported_fully_valid() {
        // Response always lacks the required "overview"; the pipeline must
        // either fail validation or return a repaired-tagged object with
        // the documented default filled in.
        let body = json!({
            "title": "Learn Rust",
            "sections": [{"heading": "Ownership"}]
        })
        .to_string();
        let client = Arc::new(ScriptedClient::always(body));
        let pipeline = pipeline_with(client.clone(), fast_config());

        let outcome = pipeline.invoke(outline_request()).await.unwrap();
        assert!(outcome.repaired);
        assert_eq!(outcome.value["overview"], json!(""));
    }

    #[tokio::test]
    async fn unrepairable_failure_is_classified() {
        let client = Arc::new(ScriptedClient::always("no structure here"));
        let pipeline = pipeline_with(client.clone(), fast_config());

        let err = pipeline.invoke(outline_request()).await.unwrap_err();
        assert!(matches!(err, InvokeError::MalformedOutput(_)));
        assert_eq!(client.call_count(), 3);
    }

    struct StubCache {
        hit: Value,
        sets: Mutex<Vec<(String, Value)>>,
    }

    #[async_trait]
    impl ContentCache for StubCache {
        async fn get(&self, _lookup: &CacheLookup) -> Option<Value> {
            Some(self.hit.clone())
        }

        async fn set(&self, class: &str, _content: &str, payload: Value, _ttl_ms: i64) {
            self.sets.lock().unwrap().push((class.to_string(), payload));
        }
    }

    #[tokio::test]
    async fn cache_hit_short_circuits_with_zero_calls() {
        let client = Arc::new(ScriptedClient::always(valid_outline()));
        let cache = Arc::new(StubCache {
            hit: json!({"title": "cached"}),
            sets: Mutex::new(Vec::new()),
        });
        let pipeline = InvocationPipeline::new(
            registry(),
            client.clone(),
            cache,
            Arc::new(AllowAllGovernor),
            fast_config(),
        );

        let outcome = pipeline.invoke(outline_request()).await.unwrap();
        assert!(outcome.from_cache);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(client.call_count(), 0);
        assert_eq!(outcome.value["title"], json!("cached"));
    }

    #[tokio::test]
    async fn bypass_cache_option_forces_upstream_call() {
        let client = Arc::new(ScriptedClient::always(valid_outline()));
        let cache = Arc::new(StubCache {
            hit: json!({"title": "cached"}),
            sets: Mutex::new(Vec::new()),
        });
        let pipeline = InvocationPipeline::new(
            registry(),
            client.clone(),
            cache.clone(),
            Arc::new(AllowAllGovernor),
            fast_config(),
        );

        let mut request = outline_request();
        request.options.bypass_cache = true;
        let outcome = pipeline.invoke(request).await.unwrap();
        assert!(!outcome.from_cache);
        assert_eq!(client.call_count(), 1);
        // Success still writes through.
        assert_eq!(cache.sets.lock().unwrap().len(), 1);
    }

    #[test]
    fn backoff_delays_grow_and_stay_within_jitter_bounds() {
        let pipeline = pipeline_with(
            Arc::new(ScriptedClient::always("{}")),
            PipelineConfig {
                base_delay_ms: 100,
                backoff_factor: 2.0,
                jitter: 0.1,
                ..Default::default()
            },
        );
        for attempt in 1..=3u32 {
            let expected = 100.0 * 2.0f64.powi(attempt as i32 - 1);
            let delay = pipeline.backoff_delay_ms(attempt) as f64;
            assert!(delay >= expected * 0.9 - 1.0, "attempt {}: {}", attempt, delay);
            assert!(delay <= expected * 1.1 + 1.0, "attempt {}: {}", attempt, delay);
        }
    }

    #[test]
    fn normalization_folds_case_and_whitespace() {
        let a = normalize_content("Make  an OUTLINE", "Topic:\n  Rust");
        let b = normalize_content("make an outline", "topic: rust");
        assert_eq!(a, b);
    }

    #[test]
    fn contract_rendering_names_fields_and_bounds() {
        let registry = registry();
        let definition = registry
            .create_schema("flashcards", &SchemaOptions::default())
            .unwrap();
        let rendered = render_contract(&definition);
        assert!(rendered.contains("topic (string, required)"));
        assert!(rendered.contains("cards (array, required"));
        assert!(rendered.contains("intro | core | stretch"));
    }
}
