// Structured-Output Contracts
//
// A SchemaDefinition is a named, composable tree of typed fields. Fragments
// are referenced by name and inlined by the registry at registration time;
// a definition handed to the validator is always fully resolved.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldType {
    /// Nested object with named fields. BTreeMap keeps rendering stable.
    Object(BTreeMap<String, FieldSpec>),
    Array(Box<FieldSpec>),
    String,
    Number,
    Boolean,
    /// Closed set of string members.
    Enum(Vec<String>),
    /// Reference to a named fragment, resolved (inlined) by the registry.
    Fragment(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub field_type: FieldType,
    pub required: bool,
    /// Minimum element count for arrays (1 = "at least one element").
    pub min_items: usize,
    /// Upper cap on array element count, if any. Validation enforces it;
    /// repair truncates to it.
    pub max_items: Option<usize>,
    /// Documented safe default, used by the repair pass for scalars.
    pub default: Option<Value>,
}

impl FieldSpec {
    fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            required: true,
            min_items: 0,
            max_items: None,
            default: None,
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::new(FieldType::Boolean)
    }

    pub fn enumeration<S: Into<String>>(members: impl IntoIterator<Item = S>) -> Self {
        Self::new(FieldType::Enum(members.into_iter().map(Into::into).collect()))
    }

    pub fn array(item: FieldSpec) -> Self {
        Self::new(FieldType::Array(Box::new(item)))
    }

    pub fn object(fields: impl IntoIterator<Item = (&'static str, FieldSpec)>) -> Self {
        Self::new(FieldType::Object(
            fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
        ))
    }

    pub fn fragment(name: impl Into<String>) -> Self {
        Self::new(FieldType::Fragment(name.into()))
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_min_items(mut self, min_items: usize) -> Self {
        self.min_items = min_items;
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = Some(max_items);
        self
    }
}

/// A named structural contract. Immutable after registration; variants are
/// new derived definitions, never in-place mutations of a shared instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,
    pub root: FieldSpec,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>, root: FieldSpec) -> Self {
        Self {
            name: name.into(),
            root,
        }
    }

    /// Validate `value` against this (fully resolved) definition.
    ///
    /// Error messages name the offending field path and array index so the
    /// repair pass and test assertions can target them precisely.
    pub fn validate(&self, value: &Value) -> ValidationResult {
        let mut errors = Vec::new();
        validate_spec(&self.root, value, &self.name, &mut errors);
        ValidationResult {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

fn validate_spec(spec: &FieldSpec, value: &Value, path: &str, errors: &mut Vec<String>) {
    match &spec.field_type {
        FieldType::Object(fields) => {
            let Some(map) = value.as_object() else {
                errors.push(format!("{}: expected object", path));
                return;
            };
            for (name, field) in fields {
                let field_path = format!("{}.{}", path, name);
                match map.get(name) {
                    Some(child) => validate_spec(field, child, &field_path, errors),
                    None if field.required => {
                        errors.push(format!("{}: missing required field", field_path))
                    }
                    None => {}
                }
            }
        }
        FieldType::Array(item) => {
            let Some(elements) = value.as_array() else {
                errors.push(format!("{}: expected array", path));
                return;
            };
            if elements.len() < spec.min_items {
                errors.push(format!(
                    "{}: expected at least {} element(s), got {}",
                    path,
                    spec.min_items,
                    elements.len()
                ));
            }
            if let Some(max_items) = spec.max_items {
                if elements.len() > max_items {
                    errors.push(format!(
                        "{}: expected at most {} element(s), got {}",
                        path,
                        max_items,
                        elements.len()
                    ));
                }
            }
            for (index, element) in elements.iter().enumerate() {
                validate_spec(item, element, &format!("{}[{}]", path, index), errors);
            }
        }
        FieldType::String => {
            if !value.is_string() {
                errors.push(format!("{}: expected string", path));
            }
        }
        FieldType::Number => {
            if !value.is_number() {
                errors.push(format!("{}: expected number", path));
            }
        }
        FieldType::Boolean => {
            if !value.is_boolean() {
                errors.push(format!("{}: expected boolean", path));
            }
        }
        FieldType::Enum(members) => match value.as_str() {
            Some(s) if coercible_enum_member(s, members).is_some() => {}
            Some(s) => errors.push(format!(
                "{}: \"{}\" is not one of [{}]",
                path,
                s,
                members.join(", ")
            )),
            None => errors.push(format!("{}: expected enum string", path)),
        },
        FieldType::Fragment(name) => {
            // Registry inlines fragments before validation; reaching one
            // here means the definition was never resolved.
            errors.push(format!("{}: unresolved fragment \"{}\"", path, name));
        }
    }
}

/// Best-effort enum membership: exact, then trimmed case-insensitive.
/// Returns the canonical member the value maps to.
pub fn coercible_enum_member<'a>(value: &str, members: &'a [String]) -> Option<&'a str> {
    if let Some(member) = members.iter().find(|m| m.as_str() == value) {
        return Some(member);
    }
    let folded = value.trim().to_lowercase();
    members
        .iter()
        .find(|m| m.to_lowercase() == folded)
        .map(|m| m.as_str())
}
