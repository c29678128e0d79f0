//! Schema model: the shape and constraints of a value.
//!
//! Schemas are built once at registration and shared as [`SchemaRef`]
//! (`Arc<Schema>`). Nothing mutates a schema after it has been handed out.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared, immutable schema handle.
pub type SchemaRef = Arc<Schema>;

/// Draft used for exported schema documents.
pub const JSON_SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2020-12/schema";

/// Union semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    OneOf,
    AnyOf,
}

/// Kind of value a schema accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SchemaKind {
    #[default]
    Any,
    Boolean,
    Integer,
    Number,
    String,
    Array,
    Object,
    /// `variants` holds the alternatives.
    Union(Combinator),
    /// Named schema resolved through the registry; breaks cycles.
    Ref { name: String, output: bool },
}

impl SchemaKind {
    /// JSON Schema `type` keyword for the kind, if it has one.
    #[must_use]
    pub fn type_name(&self) -> Option<&'static str> {
        match self {
            SchemaKind::Boolean => Some("boolean"),
            SchemaKind::Integer => Some("integer"),
            SchemaKind::Number => Some("number"),
            SchemaKind::String => Some("string"),
            SchemaKind::Array => Some("array"),
            SchemaKind::Object => Some("object"),
            _ => None,
        }
    }
}

/// Compiled `pattern` constraint.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub source: String,
    pub regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            regex: Regex::new(source)?,
        })
    }
}

/// Constraint keywords.
#[derive(Debug, Clone, Default)]
pub struct Constraints {
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub pattern: Option<Pattern>,
    pub enum_values: Vec<Value>,
}

impl Constraints {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min_length.is_none()
            && self.max_length.is_none()
            && self.minimum.is_none()
            && self.maximum.is_none()
            && self.exclusive_minimum.is_none()
            && self.exclusive_maximum.is_none()
            && self.min_items.is_none()
            && self.max_items.is_none()
            && self.pattern.is_none()
            && self.enum_values.is_empty()
    }
}

/// How undeclared object members are treated.
#[derive(Debug, Clone, Default)]
pub enum AdditionalProperties {
    #[default]
    Allow,
    Deny,
    Schema(SchemaRef),
}

/// Recursive descriptor of a value's shape and constraints.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    pub kind: SchemaKind,
    /// Registered name for named (struct/enum) schemas.
    pub name: Option<String>,
    pub format: Option<String>,
    pub description: Option<String>,
    pub default: Option<Value>,
    pub nullable: bool,
    pub read_only: bool,
    pub constraints: Constraints,
    /// Ordered object members.
    pub properties: Vec<(String, SchemaRef)>,
    pub required: Vec<String>,
    pub additional_properties: AdditionalProperties,
    pub items: Option<SchemaRef>,
    pub variants: Vec<SchemaRef>,
}

impl Schema {
    #[must_use]
    pub fn of_kind(kind: SchemaKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn any() -> Self {
        Self::of_kind(SchemaKind::Any)
    }

    #[must_use]
    pub fn boolean() -> Self {
        Self::of_kind(SchemaKind::Boolean)
    }

    #[must_use]
    pub fn integer() -> Self {
        Self::of_kind(SchemaKind::Integer)
    }

    #[must_use]
    pub fn number() -> Self {
        Self::of_kind(SchemaKind::Number)
    }

    #[must_use]
    pub fn string() -> Self {
        Self::of_kind(SchemaKind::String)
    }

    #[must_use]
    pub fn array(items: impl Into<SchemaRef>) -> Self {
        Self {
            items: Some(items.into()),
            ..Self::of_kind(SchemaKind::Array)
        }
    }

    /// Object with the given members, all of them required.
    #[must_use]
    pub fn object<I, K>(properties: I) -> Self
    where
        I: IntoIterator<Item = (K, Schema)>,
        K: Into<String>,
    {
        let properties: Vec<(String, SchemaRef)> = properties
            .into_iter()
            .map(|(k, v)| (k.into(), Arc::new(v)))
            .collect();
        let required = properties.iter().map(|(k, _)| k.clone()).collect();
        Self {
            properties,
            required,
            ..Self::of_kind(SchemaKind::Object)
        }
    }

    #[must_use]
    pub fn one_of(variants: impl IntoIterator<Item = Schema>) -> Self {
        Self {
            variants: variants.into_iter().map(Arc::new).collect(),
            ..Self::of_kind(SchemaKind::Union(Combinator::OneOf))
        }
    }

    #[must_use]
    pub fn any_of(variants: impl IntoIterator<Item = Schema>) -> Self {
        Self {
            variants: variants.into_iter().map(Arc::new).collect(),
            ..Self::of_kind(SchemaKind::Union(Combinator::AnyOf))
        }
    }

    /// Reference to a named schema.
    #[must_use]
    pub fn reference(name: impl Into<String>, output: bool) -> Self {
        Self::of_kind(SchemaKind::Ref {
            name: name.into(),
            output,
        })
    }

    /// Make members optional.
    #[must_use]
    pub fn with_optional(mut self, names: &[&str]) -> Self {
        self.required.retain(|r| !names.contains(&r.as_str()));
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<&SchemaRef> {
        self.properties
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }

    #[must_use]
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }

    /// Target name when this schema points at a named definition.
    #[must_use]
    pub fn ref_name(&self) -> Option<&str> {
        match &self.kind {
            SchemaKind::Ref { name, .. } => Some(name.as_str()),
            _ => self.name.as_deref(),
        }
    }

    /// Render as JSON Schema.
    ///
    /// Named schemas below the root are emitted as `$ref` into `#/$defs/`;
    /// `lookup` resolves their definitions and every definition reached is
    /// collected into `defs`.
    pub fn to_json<F>(&self, lookup: &F, defs: &mut BTreeMap<String, Value>) -> Value
    where
        F: Fn(&str, bool) -> Option<SchemaRef>,
    {
        self.render(lookup, defs, true)
    }

    fn render<F>(&self, lookup: &F, defs: &mut BTreeMap<String, Value>, root: bool) -> Value
    where
        F: Fn(&str, bool) -> Option<SchemaRef>,
    {
        let target = match (&self.kind, &self.name) {
            (SchemaKind::Ref { name, output }, _) => Some((name.clone(), *output, None)),
            (_, Some(name)) if !root => Some((name.clone(), false, Some(self))),
            _ => None,
        };
        if let Some((name, output, inline)) = target {
            if !defs.contains_key(&name) {
                // Placeholder first so self-references terminate.
                defs.insert(name.clone(), Value::Null);
                let rendered = match inline {
                    Some(schema) => schema.render(lookup, defs, true),
                    None => lookup(&name, output)
                        .map(|s| s.render(lookup, defs, true))
                        .unwrap_or_else(|| json!({})),
                };
                defs.insert(name.clone(), rendered);
            }
            let mut reference = Map::new();
            reference.insert("$ref".into(), json!(format!("#/$defs/{name}")));
            if inline.is_none() {
                self.annotate(&mut reference);
            }
            let reference = Value::Object(reference);
            if self.nullable {
                return json!({"anyOf": [reference, {"type": "null"}]});
            }
            return reference;
        }

        let mut out = Map::new();
        if let Some(t) = self.kind.type_name() {
            if self.nullable {
                out.insert("type".into(), json!([t, "null"]));
            } else {
                out.insert("type".into(), json!(t));
            }
        }
        if let Some(name) = &self.name {
            out.insert("title".into(), json!(name));
        }
        self.annotate(&mut out);

        match &self.kind {
            SchemaKind::Object => {
                let mut props = Map::new();
                for (key, schema) in &self.properties {
                    props.insert(key.clone(), schema.render(lookup, defs, false));
                }
                out.insert("properties".into(), Value::Object(props));
                if !self.required.is_empty() {
                    out.insert("required".into(), json!(self.required));
                }
                match &self.additional_properties {
                    AdditionalProperties::Allow => {}
                    AdditionalProperties::Deny => {
                        out.insert("additionalProperties".into(), json!(false));
                    }
                    AdditionalProperties::Schema(s) => {
                        out.insert(
                            "additionalProperties".into(),
                            s.render(lookup, defs, false),
                        );
                    }
                }
            }
            SchemaKind::Array => {
                if let Some(items) = &self.items {
                    out.insert("items".into(), items.render(lookup, defs, false));
                }
            }
            SchemaKind::Union(combinator) => {
                let key = match combinator {
                    Combinator::OneOf => "oneOf",
                    Combinator::AnyOf => "anyOf",
                };
                let mut variants: Vec<Value> = self
                    .variants
                    .iter()
                    .map(|v| v.render(lookup, defs, false))
                    .collect();
                if self.nullable {
                    variants.push(json!({"type": "null"}));
                }
                out.insert(key.into(), Value::Array(variants));
            }
            _ => {}
        }
        Value::Object(out)
    }

    /// Annotations and validation keywords shared by every rendering.
    fn annotate(&self, out: &mut Map<String, Value>) {
        if let Some(d) = &self.description {
            out.insert("description".into(), json!(d));
        }
        if let Some(f) = &self.format {
            out.insert("format".into(), json!(f));
        }
        if let Some(d) = &self.default {
            out.insert("default".into(), d.clone());
        }
        if self.read_only {
            out.insert("readOnly".into(), json!(true));
        }

        let c = &self.constraints;
        let numeric = |v: f64| -> Value {
            if v.fract() == 0.0 && v.abs() < 9.0e15 {
                json!(v as i64)
            } else {
                json!(v)
            }
        };
        if let Some(v) = c.min_length {
            out.insert("minLength".into(), json!(v));
        }
        if let Some(v) = c.max_length {
            out.insert("maxLength".into(), json!(v));
        }
        if let Some(v) = c.minimum {
            out.insert("minimum".into(), numeric(v));
        }
        if let Some(v) = c.maximum {
            out.insert("maximum".into(), numeric(v));
        }
        if let Some(v) = c.exclusive_minimum {
            out.insert("exclusiveMinimum".into(), numeric(v));
        }
        if let Some(v) = c.exclusive_maximum {
            out.insert("exclusiveMaximum".into(), numeric(v));
        }
        if let Some(v) = c.min_items {
            out.insert("minItems".into(), json!(v));
        }
        if let Some(v) = c.max_items {
            out.insert("maxItems".into(), json!(v));
        }
        if let Some(p) = &c.pattern {
            out.insert("pattern".into(), json!(p.source));
        }
        if !c.enum_values.is_empty() {
            out.insert("enum".into(), Value::Array(c.enum_values.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_lookup(_: &str, _: bool) -> Option<SchemaRef> {
        None
    }

    #[test]
    fn test_object_constructor_marks_all_required() {
        let schema = Schema::object([("name", Schema::string()), ("count", Schema::integer())])
            .with_optional(&["count"]);
        assert!(schema.is_required("name"));
        assert!(!schema.is_required("count"));
        assert_eq!(schema.properties[0].0, "name");
    }

    #[test]
    fn test_render_constraints() {
        let mut schema = Schema::string();
        schema.constraints.max_length = Some(5);
        schema.constraints.pattern = Some(Pattern::new("^[a-z]+$").unwrap());
        let mut defs = BTreeMap::new();
        let json = schema.to_json(&no_lookup, &mut defs);
        assert_eq!(
            json,
            json!({"type": "string", "maxLength": 5, "pattern": "^[a-z]+$"})
        );
        assert!(defs.is_empty());
    }

    #[test]
    fn test_nested_named_schema_becomes_ref() {
        let mut inner = Schema::object([("id", Schema::integer())]);
        inner.name = Some("Item".into());
        let outer = Schema::array(Arc::new(inner));
        let mut defs = BTreeMap::new();
        let json = outer.to_json(&no_lookup, &mut defs);
        assert_eq!(json["items"], json!({"$ref": "#/$defs/Item"}));
        assert_eq!(defs["Item"]["properties"]["id"]["type"], json!("integer"));
    }

    #[test]
    fn test_nullable_type_rendering() {
        let mut schema = Schema::integer();
        schema.nullable = true;
        schema.constraints.minimum = Some(1.0);
        let json = schema.to_json(&no_lookup, &mut BTreeMap::new());
        assert_eq!(json, json!({"type": ["integer", "null"], "minimum": 1}));
    }
}
