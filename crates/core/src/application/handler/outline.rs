// Outline Handler - single pipeline call producing a course outline

use async_trait::async_trait;
use serde_json::Value;

use crate::application::handler::{require_non_empty, HandlerContext, HandlerOutput, JobHandler};
use crate::application::pipeline::{InvokeError, InvokeOptions, InvokeRequest};
use crate::domain::DomainError;

const INSTRUCTIONS: &str = "You are a curriculum designer. Produce a clear, \
practical course outline for the given topic. Prefer concrete section \
headings over generic ones.";

pub struct OutlineHandler;

#[async_trait]
impl JobHandler for OutlineHandler {
    fn validate_params(&self, params: &Value) -> Result<(), DomainError> {
        require_non_empty(params, "title").map(|_| ())
    }

    async fn run(&self, ctx: &HandlerContext) -> Result<HandlerOutput, InvokeError> {
        let title = require_non_empty(&ctx.params, "title")?;

        ctx.progress("prepare", "Building outline request", 10).await;

        let mut content = format!("Topic: {}\n", title);
        if let Some(audience) = ctx.params.get("audience").and_then(Value::as_str) {
            content.push_str(&format!("Audience: {}\n", audience));
        }
        if let Some(notes) = ctx.params.get("notes").and_then(Value::as_str) {
            content.push_str(&format!("Notes: {}\n", notes));
        }

        ctx.progress("generate", "Waiting for generation", 40).await;
        let outcome = ctx
            .pipeline()
            .invoke(InvokeRequest {
                instructions: INSTRUCTIONS.to_string(),
                content,
                schema_name: "outline".to_string(),
                options: InvokeOptions::default(),
            })
            .await?;

        ctx.progress("finalize", "Outline ready", 95).await;
        Ok(HandlerOutput {
            result: outcome.value,
            repaired: outcome.repaired,
        })
    }
}
