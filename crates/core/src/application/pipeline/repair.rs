// Deterministic Repair Pass
//
// Runs once, after the retry budget is spent. Fills missing required
// scalars with their documented defaults, coerces out-of-enum values to
// the nearest member, and recovers partial lists from truncated array
// bodies by re-parsing balanced segments independently. The result is
// re-validated; anything still invalid means repair failed.

use serde_json::{Map, Value};

use crate::application::pipeline::parse::balanced_object_segments;
use crate::domain::schema::{coercible_enum_member, FieldSpec, FieldType, SchemaDefinition};

/// Attempt to repair a response against `definition`.
///
/// `parsed` is the body extracted by the defensive parser, if any; `raw`
/// is the untouched response text, used for segment recovery when parsing
/// failed outright. Returns a value guaranteed to validate, or None.
pub fn repair_response(
    parsed: Option<Value>,
    raw: &str,
    definition: &SchemaDefinition,
) -> Option<Value> {
    let mut value = match parsed {
        Some(value) => value,
        None => rebuild_from_segments(raw, definition)?,
    };

    if !repair_spec(&definition.root, &mut value) {
        return None;
    }

    definition.validate(&value).is_valid.then_some(value)
}

/// Reconstruct an object skeleton from a truncated body: complete
/// top-level `{...}` segments are parsed independently and assigned to the
/// first required array-of-objects field; remaining required scalars get
/// their defaults during the repair walk.
fn rebuild_from_segments(raw: &str, definition: &SchemaDefinition) -> Option<Value> {
    let FieldType::Object(fields) = &definition.root.field_type else {
        return None;
    };

    let (list_field, item_spec) = fields.iter().find_map(|(name, spec)| match &spec.field_type {
        FieldType::Array(item) if spec.required && matches!(item.field_type, FieldType::Object(_)) => {
            Some((name.clone(), item.as_ref().clone()))
        }
        _ => None,
    })?;

    let elements: Vec<Value> = balanced_object_segments(raw)
        .into_iter()
        .filter_map(|segment| serde_json::from_str::<Value>(segment).ok())
        .filter(|element| {
            let mut candidate = element.clone();
            repair_spec(&item_spec, &mut candidate)
        })
        .collect();

    if elements.is_empty() {
        return None;
    }

    let mut object = Map::new();
    object.insert(list_field, Value::Array(elements));
    Some(Value::Object(object))
}

/// Repair `value` in place against `spec`. Returns false when the value is
/// beyond deterministic repair.
fn repair_spec(spec: &FieldSpec, value: &mut Value) -> bool {
    match &spec.field_type {
        FieldType::Object(fields) => {
            let Some(map) = value.as_object_mut() else {
                return false;
            };
            for (name, field) in fields {
                match map.get_mut(name) {
                    Some(child) => {
                        if !repair_spec(field, child) {
                            return false;
                        }
                    }
                    None if field.required => match default_for(field) {
                        Some(default) => {
                            map.insert(name.clone(), default);
                        }
                        None => return false,
                    },
                    None => {}
                }
            }
            true
        }
        FieldType::Array(item) => {
            let Some(elements) = value.as_array_mut() else {
                return false;
            };
            // Drop elements that cannot be repaired instead of failing the
            // whole list, then enforce the cap.
            elements.retain_mut(|element| repair_spec(item, element));
            if let Some(max_items) = spec.max_items {
                elements.truncate(max_items);
            }
            elements.len() >= spec.min_items
        }
        FieldType::String => match value {
            Value::String(_) => true,
            Value::Number(n) => {
                *value = Value::String(n.to_string());
                true
            }
            _ => replace_with_default(spec, value),
        },
        FieldType::Number => match value {
            Value::Number(_) => true,
            Value::String(s) => match s.parse::<f64>() {
                Ok(parsed) => {
                    *value = serde_json::json!(parsed);
                    true
                }
                Err(_) => replace_with_default(spec, value),
            },
            _ => replace_with_default(spec, value),
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => true,
            _ => replace_with_default(spec, value),
        },
        FieldType::Enum(members) => {
            let coerced = value
                .as_str()
                .map(|s| nearest_enum_member(s, members).to_string());
            match coerced {
                Some(member) => {
                    *value = Value::String(member);
                    true
                }
                None => replace_with_default(spec, value),
            }
        }
        FieldType::Fragment(_) => false,
    }
}

fn replace_with_default(spec: &FieldSpec, value: &mut Value) -> bool {
    match default_for(spec) {
        Some(default) => {
            *value = default;
            true
        }
        None => false,
    }
}

/// Documented safe default for a spec: the explicit default if present,
/// otherwise the type's neutral value. Arrays have no safe default beyond
/// the empty list, which only helps when `min_items` allows it.
fn default_for(spec: &FieldSpec) -> Option<Value> {
    if let Some(default) = &spec.default {
        return Some(default.clone());
    }
    match &spec.field_type {
        FieldType::String => Some(Value::String(String::new())),
        FieldType::Number => Some(serde_json::json!(0)),
        FieldType::Boolean => Some(Value::Bool(false)),
        FieldType::Enum(members) => members.first().map(|m| Value::String(m.clone())),
        FieldType::Array(_) if spec.min_items == 0 => Some(Value::Array(Vec::new())),
        FieldType::Object(fields) => {
            let mut map = Map::new();
            for (name, field) in fields {
                if field.required {
                    map.insert(name.clone(), default_for(field)?);
                }
            }
            Some(Value::Object(map))
        }
        _ => None,
    }
}

/// Nearest valid member: exact/case-insensitive first, then prefix or
/// substring overlap, falling back to the declared default or the first
/// member.
fn nearest_enum_member<'a>(value: &str, members: &'a [String]) -> &'a str {
    if let Some(member) = coercible_enum_member(value, members) {
        return member;
    }
    let folded = value.trim().to_lowercase();
    members
        .iter()
        .find(|m| {
            let member = m.to_lowercase();
            member.starts_with(&folded) || folded.starts_with(&member) || folded.contains(&member)
        })
        .or_else(|| members.first())
        .map(String::as_str)
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flashcards_schema() -> SchemaDefinition {
        SchemaDefinition::new(
            "flashcards",
            FieldSpec::object([
                ("topic", FieldSpec::string().with_default(json!("Untitled"))),
                (
                    "cards",
                    FieldSpec::array(FieldSpec::object([
                        ("front", FieldSpec::string()),
                        ("back", FieldSpec::string()),
                        (
                            "difficulty",
                            FieldSpec::enumeration(["intro", "core", "stretch"])
                                .with_default(json!("core")),
                        ),
                    ]))
                    .with_min_items(1),
                ),
            ]),
        )
    }

    #[test]
    fn fills_missing_required_scalar_with_documented_default() {
        let schema = flashcards_schema();
        let value = json!({
            "cards": [{"front": "f", "back": "b", "difficulty": "core"}]
        });
        let repaired = repair_response(Some(value), "", &schema).unwrap();
        assert_eq!(repaired["topic"], json!("Untitled"));
    }

    #[test]
    fn coerces_out_of_enum_to_nearest_member() {
        let schema = flashcards_schema();
        let value = json!({
            "topic": "T",
            "cards": [{"front": "f", "back": "b", "difficulty": "Stretch goal"}]
        });
        let repaired = repair_response(Some(value), "", &schema).unwrap();
        assert_eq!(repaired["cards"][0]["difficulty"], json!("stretch"));
    }

    #[test]
    fn unknown_enum_value_falls_back_to_default() {
        let schema = flashcards_schema();
        let value = json!({
            "topic": "T",
            "cards": [{"front": "f", "back": "b", "difficulty": "impossible"}]
        });
        let repaired = repair_response(Some(value), "", &schema).unwrap();
        assert_eq!(repaired["cards"][0]["difficulty"], json!("core"));
    }

    #[test]
    fn recovers_partial_list_from_truncated_raw() {
        let schema = flashcards_schema();
        let raw = r#"{"topic": "Rust", "cards": [
            {"front": "What is ownership?", "back": "Move semantics", "difficulty": "core"},
            {"front": "What is a trait?", "back": "Shared behavior", "difficulty": "intro"},
            {"front": "What is"#;
        let repaired = repair_response(None, raw, &schema).unwrap();
        let cards = repaired["cards"].as_array().unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(repaired["topic"], json!("Untitled"));
    }

    #[test]
    fn unrepairable_when_no_elements_survive() {
        let schema = flashcards_schema();
        assert!(repair_response(None, "no json here at all", &schema).is_none());
    }

    #[test]
    fn drops_broken_elements_but_keeps_the_rest() {
        let schema = flashcards_schema();
        let value = json!({
            "topic": "T",
            "cards": [
                {"front": "ok", "back": "ok", "difficulty": "core"},
                "not an object",
                {"front": "also ok", "back": "fine", "difficulty": "intro"}
            ]
        });
        let repaired = repair_response(Some(value), "", &schema).unwrap();
        assert_eq!(repaired["cards"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn string_number_cross_coercion() {
        let schema = SchemaDefinition::new(
            "t",
            FieldSpec::object([
                ("count", FieldSpec::number()),
                ("label", FieldSpec::string()),
            ]),
        );
        let value = json!({"count": "12", "label": 7});
        let repaired = repair_response(Some(value), "", &schema).unwrap();
        assert_eq!(repaired["count"], json!(12.0));
        assert_eq!(repaired["label"], json!("7"));
    }

    #[test]
    fn result_always_validates() {
        let schema = flashcards_schema();
        let value = json!({
            "cards": [{"front": 1, "back": "b", "difficulty": "weird"}]
        });
        if let Some(repaired) = repair_response(Some(value), "", &schema) {
            assert!(schema.validate(&repaired).is_valid);
        }
    }
}
