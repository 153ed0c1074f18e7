// Flashcards Handler - list-shaped output with an optional card cap

use async_trait::async_trait;
use serde_json::Value;

use crate::application::handler::{require_non_empty, HandlerContext, HandlerOutput, JobHandler};
use crate::application::pipeline::{InvokeError, InvokeOptions, InvokeRequest};
use crate::application::schema_registry::SchemaOptions;
use crate::domain::DomainError;

const INSTRUCTIONS: &str = "You are a study-material author. Write atomic \
flashcards: one fact per card, fronts phrased as questions.";

pub struct FlashcardsHandler;

#[async_trait]
impl JobHandler for FlashcardsHandler {
    fn validate_params(&self, params: &Value) -> Result<(), DomainError> {
        require_non_empty(params, "title")?;
        if let Some(count) = params.get("count") {
            let valid = count.as_u64().is_some_and(|n| (1..=100).contains(&n));
            if !valid {
                return Err(DomainError::ValidationError(
                    "params.count must be an integer between 1 and 100".to_string(),
                ));
            }
        }
        Ok(())
    }

    async fn run(&self, ctx: &HandlerContext) -> Result<HandlerOutput, InvokeError> {
        let title = require_non_empty(&ctx.params, "title")?;
        let count = ctx.params.get("count").and_then(Value::as_u64);

        ctx.progress("prepare", "Building flashcard request", 10).await;

        let mut content = format!("Topic: {}\n", title);
        if let Some(count) = count {
            content.push_str(&format!("Produce exactly {} cards.\n", count));
        }

        let options = InvokeOptions {
            schema: SchemaOptions {
                max_items: count.map(|n| n as usize),
                ..Default::default()
            },
            ..Default::default()
        };

        ctx.progress("generate", "Waiting for generation", 40).await;
        let outcome = ctx
            .pipeline()
            .invoke(InvokeRequest {
                instructions: INSTRUCTIONS.to_string(),
                content,
                schema_name: "flashcards".to_string(),
                options,
            })
            .await?;

        ctx.progress("finalize", "Cards ready", 95).await;
        Ok(HandlerOutput {
            result: outcome.value,
            repaired: outcome.repaired,
        })
    }
}
