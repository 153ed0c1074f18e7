// Lesson Plan Handler - two chained pipeline calls
//
// First call collects clarifying questions and assumptions; its structured
// output is folded into the prompt of the second call that produces the
// final plan.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::application::handler::{require_non_empty, HandlerContext, HandlerOutput, JobHandler};
use crate::application::pipeline::{InvokeError, InvokeOptions, InvokeRequest};
use crate::domain::DomainError;

const CLARIFY_INSTRUCTIONS: &str = "You are a teaching assistant preparing to \
plan a lesson. List the clarifying questions you would ask, and the working \
assumptions you will proceed with in their absence.";

const PLAN_INSTRUCTIONS: &str = "You are an experienced instructor. Write a \
step-by-step lesson plan for the given topic, honoring the stated \
assumptions.";

pub struct LessonPlanHandler;

#[async_trait]
impl JobHandler for LessonPlanHandler {
    fn validate_params(&self, params: &Value) -> Result<(), DomainError> {
        require_non_empty(params, "title").map(|_| ())
    }

    async fn run(&self, ctx: &HandlerContext) -> Result<HandlerOutput, InvokeError> {
        let title = require_non_empty(&ctx.params, "title")?;

        ctx.progress("clarify", "Collecting clarifying questions", 15).await;
        let clarify = ctx
            .pipeline()
            .invoke(InvokeRequest {
                instructions: CLARIFY_INSTRUCTIONS.to_string(),
                content: format!("Topic: {}\n", title),
                schema_name: "clarify".to_string(),
                options: InvokeOptions::default(),
            })
            .await?;

        ctx.progress("draft", "Drafting lesson plan", 50).await;
        let mut content = format!("Topic: {}\n", title);
        if let Some(questions) = clarify.value.get("questions").and_then(Value::as_array) {
            content.push_str("\nQuestions already considered:\n");
            for question in questions.iter().filter_map(Value::as_str) {
                content.push_str(&format!("- {}\n", question));
            }
        }
        if let Some(assumptions) = clarify.value.get("assumptions").and_then(Value::as_array) {
            content.push_str("\nWorking assumptions:\n");
            for assumption in assumptions.iter().filter_map(Value::as_str) {
                content.push_str(&format!("- {}\n", assumption));
            }
        }

        let plan = ctx
            .pipeline()
            .invoke(InvokeRequest {
                instructions: PLAN_INSTRUCTIONS.to_string(),
                content,
                schema_name: "lesson_plan".to_string(),
                options: InvokeOptions::default(),
            })
            .await?;

        ctx.progress("finalize", "Lesson plan ready", 95).await;
        Ok(HandlerOutput {
            result: json!({
                "plan": plan.value,
                "clarifications": clarify.value,
            }),
            repaired: clarify.repaired || plan.repaired,
        })
    }
}
