// Schema Registry
//
// Owns the named output contracts. Each name resolves to a dispatch entry
// bundling the (fragment-resolved) definition and its output budget, so
// request handling looks a schema up once instead of string-branching.
// Derived variants are memoized by (name, options) and never mutate the
// base definition.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::domain::schema::{FieldSpec, FieldType, SchemaDefinition};
use crate::domain::{DomainError, ValidationResult};

/// Token/temperature budget for one schema. Schemas with larger expected
/// output get wider budgets.
#[derive(Debug, Clone, Copy)]
pub struct OutputBudget {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for OutputBudget {
    fn default() -> Self {
        Self {
            max_output_tokens: 1_024,
            temperature: 0.4,
        }
    }
}

/// Per-request schema adjustments. Also the memoization key material for
/// derived variants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaOptions {
    /// Keep only these top-level fields.
    pub include_fields: Option<Vec<String>>,
    /// Restrict the named enum field to a subset of its members.
    pub restrict_enum: Option<(String, Vec<String>)>,
    /// Cap element counts for every array field.
    pub max_items: Option<usize>,
}

impl SchemaOptions {
    pub fn is_default(&self) -> bool {
        *self == SchemaOptions::default()
    }

    /// Stable key for the variant memo table.
    fn memo_key(&self) -> String {
        let fields = self
            .include_fields
            .as_ref()
            .map(|f| f.join(","))
            .unwrap_or_default();
        let enums = self
            .restrict_enum
            .as_ref()
            .map(|(field, members)| format!("{}={}", field, members.join(",")))
            .unwrap_or_default();
        let cap = self.max_items.map(|n| n.to_string()).unwrap_or_default();
        format!("f:{}|e:{}|n:{}", fields, enums, cap)
    }
}

/// Dispatch entry: everything request handling needs for one schema name.
#[derive(Clone)]
pub struct SchemaEntry {
    pub definition: Arc<SchemaDefinition>,
    pub budget: OutputBudget,
}

#[derive(Default)]
struct Inner {
    fragments: HashMap<String, FieldSpec>,
    entries: HashMap<String, SchemaEntry>,
    /// Memoized derived variants, keyed by "name|memo_key".
    variants: HashMap<String, Arc<SchemaDefinition>>,
}

/// Explicit owned registry; constructed once at startup and passed by Arc
/// into every component that needs it. No process-wide singletons.
pub struct SchemaRegistry {
    inner: RwLock<Inner>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Register a reusable named fragment. Fragments may reference other
    /// fragments; resolution happens when a schema is registered.
    pub fn register_fragment(&self, name: impl Into<String>, spec: FieldSpec) {
        let mut inner = self.inner.write().unwrap();
        inner.fragments.insert(name.into(), spec);
    }

    /// Register a schema under `name`, inlining fragment references.
    /// Fails on unknown fragments or reference cycles.
    pub fn register(
        &self,
        name: impl Into<String>,
        root: FieldSpec,
        budget: OutputBudget,
    ) -> Result<(), DomainError> {
        let name = name.into();
        let mut inner = self.inner.write().unwrap();
        let resolved = resolve_spec(&root, &inner.fragments, &mut Vec::new())?;
        let definition = Arc::new(SchemaDefinition::new(name.clone(), resolved));
        inner.entries.insert(name, SchemaEntry { definition, budget });
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        self.inner.read().unwrap().entries.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Result<SchemaEntry, DomainError> {
        self.inner
            .read()
            .unwrap()
            .entries
            .get(name)
            .cloned()
            .ok_or_else(|| DomainError::SchemaNotFound(name.to_string()))
    }

    /// Resolve `name` with per-request options applied. Results are
    /// memoized by (name, options); the base definition is returned
    /// untouched for default options.
    pub fn create_schema(
        &self,
        name: &str,
        options: &SchemaOptions,
    ) -> Result<Arc<SchemaDefinition>, DomainError> {
        let entry = self.get(name)?;
        if options.is_default() {
            return Ok(entry.definition);
        }

        let key = format!("{}|{}", name, options.memo_key());
        if let Some(variant) = self.inner.read().unwrap().variants.get(&key) {
            return Ok(Arc::clone(variant));
        }

        let derived = Arc::new(derive_variant(&entry.definition, options));
        let mut inner = self.inner.write().unwrap();
        let variant = inner.variants.entry(key).or_insert(derived);
        Ok(Arc::clone(variant))
    }

    /// Merge the top-level fields of several registered schemas into one
    /// composite definition (later names win on field conflicts).
    pub fn combine_schemas(&self, names: &[&str]) -> Result<SchemaDefinition, DomainError> {
        let mut combined = std::collections::BTreeMap::new();
        for name in names {
            let entry = self.get(name)?;
            match &entry.definition.root.field_type {
                FieldType::Object(fields) => {
                    for (field, spec) in fields {
                        combined.insert(field.clone(), spec.clone());
                    }
                }
                _ => {
                    return Err(DomainError::ValidationError(format!(
                        "schema \"{}\" has a non-object root and cannot be combined",
                        name
                    )))
                }
            }
        }
        let mut root = FieldSpec::object([]);
        root.field_type = FieldType::Object(combined);
        Ok(SchemaDefinition::new(names.join("+"), root))
    }

    /// Validate `value` against the registered schema `name`.
    pub fn validate(
        &self,
        value: &serde_json::Value,
        name: &str,
    ) -> Result<ValidationResult, DomainError> {
        Ok(self.get(name)?.definition.validate(value))
    }
}

/// Inline fragment references; `stack` detects cycles.
fn resolve_spec(
    spec: &FieldSpec,
    fragments: &HashMap<String, FieldSpec>,
    stack: &mut Vec<String>,
) -> Result<FieldSpec, DomainError> {
    let mut resolved = spec.clone();
    resolved.field_type = match &spec.field_type {
        FieldType::Fragment(name) => {
            if stack.iter().any(|n| n == name) {
                return Err(DomainError::FragmentCycle(name.clone()));
            }
            let fragment = fragments
                .get(name)
                .ok_or_else(|| DomainError::SchemaNotFound(format!("fragment \"{}\"", name)))?;
            stack.push(name.clone());
            let inlined = resolve_spec(fragment, fragments, stack)?;
            stack.pop();
            // The reference site keeps its own required/min_items/default;
            // the fragment contributes the structure.
            return Ok(FieldSpec {
                field_type: inlined.field_type,
                required: spec.required,
                min_items: spec.min_items.max(inlined.min_items),
                max_items: spec.max_items.or(inlined.max_items),
                default: spec.default.clone().or(inlined.default),
            });
        }
        FieldType::Object(fields) => {
            let mut out = std::collections::BTreeMap::new();
            for (name, field) in fields {
                out.insert(name.clone(), resolve_spec(field, fragments, stack)?);
            }
            FieldType::Object(out)
        }
        FieldType::Array(item) => FieldType::Array(Box::new(resolve_spec(item, fragments, stack)?)),
        other => other.clone(),
    };
    Ok(resolved)
}

/// Build a derived definition with request options applied.
fn derive_variant(base: &SchemaDefinition, options: &SchemaOptions) -> SchemaDefinition {
    let mut root = base.root.clone();

    if let (FieldType::Object(fields), Some(include)) =
        (&mut root.field_type, options.include_fields.as_ref())
    {
        fields.retain(|name, _| include.iter().any(|f| f == name));
    }

    if let Some((field, members)) = options.restrict_enum.as_ref() {
        restrict_enum_field(&mut root, field, members);
    }

    if let Some(max_items) = options.max_items {
        cap_arrays(&mut root, max_items);
    }

    SchemaDefinition::new(base.name.clone(), root)
}

fn restrict_enum_field(spec: &mut FieldSpec, target: &str, members: &[String]) {
    match &mut spec.field_type {
        FieldType::Object(fields) => {
            for (name, field) in fields.iter_mut() {
                if name == target {
                    if let FieldType::Enum(existing) = &mut field.field_type {
                        existing.retain(|m| members.contains(m));
                    }
                } else {
                    restrict_enum_field(field, target, members);
                }
            }
        }
        FieldType::Array(item) => restrict_enum_field(item, target, members),
        _ => {}
    }
}

fn cap_arrays(spec: &mut FieldSpec, max_items: usize) {
    match &mut spec.field_type {
        FieldType::Array(item) => {
            spec.max_items = Some(spec.max_items.map_or(max_items, |m| m.min(max_items)));
            cap_arrays(item, max_items);
        }
        FieldType::Object(fields) => {
            for field in fields.values_mut() {
                cap_arrays(field, max_items);
            }
        }
        _ => {}
    }
}
