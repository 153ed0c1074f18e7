// Built-in Schema Catalog
//
// Registered once at startup. Defaults on scalar fields double as the
// documented safe values the repair pass fills in.

use serde_json::json;

use crate::application::schema_registry::{OutputBudget, SchemaRegistry};
use crate::domain::schema::FieldSpec;
use crate::domain::DomainError;

pub fn register_builtin_schemas(registry: &SchemaRegistry) -> Result<(), DomainError> {
    registry.register_fragment(
        "section",
        FieldSpec::object([
            ("heading", FieldSpec::string().with_default(json!("Untitled section"))),
            ("summary", FieldSpec::string().optional()),
            (
                "bullet_points",
                FieldSpec::array(FieldSpec::string()).optional(),
            ),
        ]),
    );

    registry.register_fragment(
        "card",
        FieldSpec::object([
            ("front", FieldSpec::string().with_default(json!(""))),
            ("back", FieldSpec::string().with_default(json!(""))),
            (
                "difficulty",
                FieldSpec::enumeration(["intro", "core", "stretch"])
                    .with_default(json!("core")),
            ),
        ]),
    );

    registry.register(
        "outline",
        FieldSpec::object([
            ("title", FieldSpec::string().with_default(json!("Untitled"))),
            ("overview", FieldSpec::string().with_default(json!(""))),
            (
                "sections",
                FieldSpec::array(FieldSpec::fragment("section")).with_min_items(1),
            ),
        ]),
        OutputBudget {
            max_output_tokens: 1_400,
            temperature: 0.4,
        },
    )?;

    registry.register(
        "flashcards",
        FieldSpec::object([
            ("topic", FieldSpec::string().with_default(json!("Untitled"))),
            (
                "cards",
                FieldSpec::array(FieldSpec::fragment("card")).with_min_items(1),
            ),
        ]),
        OutputBudget {
            max_output_tokens: 2_000,
            temperature: 0.5,
        },
    )?;

    // First call of the lesson-plan chain: small, low temperature.
    registry.register(
        "clarify",
        FieldSpec::object([
            (
                "questions",
                FieldSpec::array(FieldSpec::string()).with_min_items(1),
            ),
            (
                "assumptions",
                FieldSpec::array(FieldSpec::string()).optional(),
            ),
        ]),
        OutputBudget {
            max_output_tokens: 600,
            temperature: 0.3,
        },
    )?;

    registry.register(
        "lesson_plan",
        FieldSpec::object([
            ("title", FieldSpec::string().with_default(json!("Untitled"))),
            ("objective", FieldSpec::string().with_default(json!(""))),
            (
                "duration_minutes",
                FieldSpec::number().with_default(json!(30)),
            ),
            (
                "steps",
                FieldSpec::array(FieldSpec::object([
                    ("name", FieldSpec::string().with_default(json!("Step"))),
                    ("detail", FieldSpec::string().with_default(json!(""))),
                ]))
                .with_min_items(1),
            ),
            (
                "materials",
                FieldSpec::array(FieldSpec::string()).optional(),
            ),
        ]),
        OutputBudget {
            max_output_tokens: 1_800,
            temperature: 0.4,
        },
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobType;

    #[test]
    fn builtin_catalog_registers_every_job_type_schema() {
        let registry = SchemaRegistry::new();
        register_builtin_schemas(&registry).unwrap();

        for job_type in JobType::ALL {
            assert!(
                registry.exists(job_type.schema_name()),
                "missing schema for {}",
                job_type
            );
        }
        assert!(registry.exists("clarify"));
    }

    #[test]
    fn outline_schema_accepts_a_typical_response() {
        let registry = SchemaRegistry::new();
        register_builtin_schemas(&registry).unwrap();

        let result = registry
            .validate(
                &serde_json::json!({
                    "title": "Learn Rust",
                    "overview": "A practical path.",
                    "sections": [
                        {"heading": "Ownership", "summary": "The core model"},
                        {"heading": "Traits", "bullet_points": ["impl", "dyn"]}
                    ]
                }),
                "outline",
            )
            .unwrap();
        assert!(result.is_valid, "errors: {:?}", result.errors);
    }
}
