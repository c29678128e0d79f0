//! Schema registry: derives, names and memoizes schemas per Rust type.
//!
//! # Memoization
//!
//! Schemas are cached per `(TypeId, output mode)`. Asking for the same type
//! twice returns the identical [`SchemaRef`].
//!
//! # Cycles
//!
//! A type reached again while its own schema is still being built yields a
//! [`SchemaKind::Ref`] node naming it instead of recursing. The full definition
//! is registered once under that name and resolved lazily by the validator.
//!
//! # Naming
//!
//! Struct and enum schemas are named from the Rust type name with module paths
//! stripped and generic arguments folded in (`Page<Item>` becomes `PageItem`).
//! A distinct type claiming an already-used name fails with
//! [`SchemaError::SchemaNameConflict`].
//!
//! # Output mode
//!
//! In output mode named object schemas additionally declare an optional,
//! read-only `$schema` member carrying the URI of the schema document.

use super::describe::{FieldDescription, FieldRole, ScalarKind, StructDescription, Tags};
use super::model::{
    AdditionalProperties, Constraints, Pattern, Schema, SchemaKind, SchemaRef,
    JSON_SCHEMA_DIALECT,
};
use super::{TypeDescription, TypeRef};
use crate::error::SchemaError;
use serde_json::{json, Value};
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// Member added to output-mode object schemas.
pub const SCHEMA_PROPERTY: &str = "$schema";

#[derive(Debug)]
struct NamedEntry {
    type_id: TypeId,
    type_name: &'static str,
    input: Option<SchemaRef>,
    output: Option<SchemaRef>,
}

/// Registry of derived schemas.
///
/// Built with `&mut` during registration and read-only while serving.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    memo: HashMap<(TypeId, bool), SchemaRef>,
    building: HashMap<(TypeId, bool), String>,
    named: BTreeMap<String, NamedEntry>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Schema for `ty`, deriving and memoizing it on first use.
    ///
    /// # Arguments
    ///
    /// * `ty` - Type to describe
    /// * `for_output` - Build the response flavour (adds `$schema`)
    /// * `hint` - Name to use when the type name yields no usable name
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] on name conflicts, invalid patterns or literals
    /// that do not parse as the field type.
    pub fn schema_for(
        &mut self,
        ty: TypeRef,
        for_output: bool,
        hint: &str,
    ) -> Result<SchemaRef, SchemaError> {
        let key = (ty.id, for_output);
        if let Some(schema) = self.memo.get(&key) {
            return Ok(Arc::clone(schema));
        }
        if let Some(name) = self.building.get(&key) {
            debug!(schema_name = %name, "Recursive type, emitting reference");
            return Ok(Arc::new(Schema::reference(name.clone(), for_output)));
        }

        let schema = match ty.describe() {
            TypeDescription::Scalar(kind) => scalar_schema(kind),
            TypeDescription::Enum {
                schema_name,
                values,
            } => {
                let name = self.claim_name(ty, schema_name, hint)?;
                let mut schema = Schema::string();
                schema.name = Some(name);
                schema.constraints.enum_values = values.iter().map(|v| json!(v)).collect();
                schema
            }
            TypeDescription::Optional(inner) => {
                let inner = self.schema_for(inner, for_output, hint)?;
                nullable(&inner)
            }
            TypeDescription::Boxed(inner) => {
                let inner = self.schema_for(inner, for_output, hint)?;
                self.memo.insert(key, Arc::clone(&inner));
                return Ok(inner);
            }
            TypeDescription::List(inner) => {
                let items = self.schema_for(inner, for_output, hint)?;
                Schema::array(items)
            }
            TypeDescription::Map(inner) => {
                let values = self.schema_for(inner, for_output, hint)?;
                let mut schema = Schema::of_kind(SchemaKind::Object);
                schema.additional_properties = AdditionalProperties::Schema(values);
                schema
            }
            TypeDescription::Any | TypeDescription::Unit => Schema::any(),
            TypeDescription::Struct(desc) => {
                let name = self.claim_name(ty, desc.schema_name, hint)?;
                self.building.insert(key, name.clone());
                let built = self.struct_schema(ty, &desc, name, for_output);
                self.building.remove(&key);
                built?
            }
            TypeDescription::Custom(build) => build(self, for_output)?,
        };

        let schema = Arc::new(schema);
        self.memo.insert(key, Arc::clone(&schema));
        if let Some(name) = &schema.name {
            if let Some(entry) = self.named.get_mut(name) {
                let slot = if for_output {
                    &mut entry.output
                } else {
                    &mut entry.input
                };
                *slot = Some(Arc::clone(&schema));
            }
            info!(
                schema_name = %name,
                type_name = ty.type_name,
                for_output,
                "Schema registered"
            );
        }
        Ok(schema)
    }

    /// Look up a named schema; output mode falls back to input and vice versa.
    #[must_use]
    pub fn lookup(&self, name: &str, output: bool) -> Option<SchemaRef> {
        let entry = self.named.get(name)?;
        let (first, second) = if output {
            (&entry.output, &entry.input)
        } else {
            (&entry.input, &entry.output)
        };
        first.as_ref().or(second.as_ref()).map(Arc::clone)
    }

    /// Fail when `schema` references a name this registry does not hold.
    ///
    /// # Errors
    ///
    /// [`SchemaError::UnresolvedReference`] naming the first missing target.
    pub fn check_references(&self, schema: &Schema) -> Result<(), SchemaError> {
        if let SchemaKind::Ref { name, output } = &schema.kind {
            if self.lookup(name, *output).is_none() {
                return Err(SchemaError::UnresolvedReference { name: name.clone() });
            }
            return Ok(());
        }
        let extra = match &schema.additional_properties {
            AdditionalProperties::Schema(extra) => Some(extra),
            _ => None,
        };
        schema
            .properties
            .iter()
            .map(|(_, p)| p)
            .chain(schema.items.iter())
            .chain(schema.variants.iter())
            .chain(extra)
            .try_for_each(|child| self.check_references(child))
    }

    /// Registered schema names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.named.keys().map(String::as_str)
    }

    /// Self-contained JSON Schema document for a named schema.
    ///
    /// Nested named schemas are emitted under `$defs`. The output flavour is
    /// preferred so documents describe what responses carry.
    #[must_use]
    pub fn document(&self, name: &str, id: Option<&str>) -> Option<Value> {
        let schema = self.lookup(name, true)?;
        let lookup = |n: &str, output: bool| self.lookup(n, output);
        let mut defs = BTreeMap::new();
        // Reserve the root name so self-references point back at the root.
        defs.insert(name.to_string(), Value::Null);
        let mut doc = schema.to_json(&lookup, &mut defs);
        defs.remove(name);
        if let Value::Object(map) = &mut doc {
            let mut head = serde_json::Map::new();
            head.insert("$schema".into(), json!(JSON_SCHEMA_DIALECT));
            if let Some(id) = id {
                head.insert("$id".into(), json!(id));
            }
            head.extend(std::mem::take(map));
            if !defs.is_empty() {
                head.insert("$defs".into(), json!(defs));
            }
            *map = head;
        }
        // Self references use the root definition.
        Some(rewrite_self_refs(doc, name))
    }

    fn claim_name(
        &mut self,
        ty: TypeRef,
        explicit: Option<&'static str>,
        hint: &str,
    ) -> Result<String, SchemaError> {
        let name = match explicit {
            Some(n) => n.to_string(),
            None => {
                let derived = default_schema_namer(ty.type_name);
                if derived.is_empty() {
                    default_schema_namer(hint)
                } else {
                    derived
                }
            }
        };
        match self.named.get(&name) {
            Some(entry) if entry.type_id != ty.id => Err(SchemaError::SchemaNameConflict {
                name,
                existing: entry.type_name,
                incoming: ty.type_name,
            }),
            Some(_) => Ok(name),
            None => {
                self.named.insert(
                    name.clone(),
                    NamedEntry {
                        type_id: ty.id,
                        type_name: ty.type_name,
                        input: None,
                        output: None,
                    },
                );
                Ok(name)
            }
        }
    }

    fn struct_schema(
        &mut self,
        ty: TypeRef,
        desc: &StructDescription,
        name: String,
        for_output: bool,
    ) -> Result<Schema, SchemaError> {
        let mut schema = Schema::of_kind(SchemaKind::Object);
        schema.description = desc.doc.map(str::to_string);
        if desc.deny_unknown {
            schema.additional_properties = AdditionalProperties::Deny;
        }
        if for_output {
            let mut link = Schema::string();
            link.format = Some("uri".into());
            link.read_only = true;
            link.description = Some("A URL to the JSON Schema for this object.".into());
            schema
                .properties
                .push((SCHEMA_PROPERTY.to_string(), Arc::new(link)));
        }
        for field in &desc.fields {
            if field.role != FieldRole::Property {
                return Err(SchemaError::MisplacedRole {
                    owner: ty.type_name,
                    field: field.name,
                    role: field.role,
                });
            }
            let hint = format!("{name}{}", upper_first(field.name));
            let base = self.schema_for(field.ty, for_output, &hint)?;
            let property = self.field_schema(base, field, &format!("{name}.{}", field.name))?;
            if field.required {
                schema.required.push(field.name.to_string());
            }
            schema.properties.push((field.name.to_string(), property));
        }
        schema.name = Some(name);
        Ok(schema)
    }

    /// Apply declared tags to a field's base schema.
    ///
    /// Returns `base` untouched when the field declares nothing. Named bases are
    /// wrapped in a reference so the shared definition stays untouched.
    pub fn field_schema(
        &self,
        base: SchemaRef,
        field: &FieldDescription,
        label: &str,
    ) -> Result<SchemaRef, SchemaError> {
        let tags = &field.tags;
        let documented = field.doc.is_some()
            || field.default.is_some()
            || tags.format.is_some()
            || tags.read_only;
        if !tags.has_constraints() && !documented {
            return Ok(base);
        }

        let mut schema = match base.ref_name() {
            Some(target) if base.name.is_some() => {
                let mut wrapper = Schema::reference(target, false);
                if let SchemaKind::Ref { output, .. } = &mut wrapper.kind {
                    *output = base
                        .properties
                        .first()
                        .is_some_and(|(k, _)| k == SCHEMA_PROPERTY);
                }
                wrapper
            }
            _ => (*base).clone(),
        };
        schema.description = field.doc.map(str::to_string).or(schema.description);
        if let Some(format) = tags.format {
            schema.format = Some(format.to_string());
        }
        schema.read_only |= tags.read_only;

        if schema.kind == SchemaKind::Array && has_scalar_constraints(tags) {
            // Scalar constraints on a list apply to its items.
            if let Some(items) = &schema.items {
                let mut item = (**items).clone();
                apply_constraints(&mut item.constraints, &item.kind, tags, label)?;
                schema.items = Some(Arc::new(item));
            }
            schema.constraints.min_items = tags.min_items;
            schema.constraints.max_items = tags.max_items;
        } else {
            let kind = literal_kind(&schema, &base);
            apply_constraints(&mut schema.constraints, &kind, tags, label)?;
        }

        if let Some(default) = field.default {
            let kind = match (&schema.kind, &schema.items) {
                (SchemaKind::Array, Some(items)) => items.kind.clone(),
                _ => literal_kind(&schema, &base),
            };
            let value = if schema.kind == SchemaKind::Array {
                Value::Array(
                    default
                        .split(',')
                        .map(|p| parse_literal(&kind, p.trim(), label, "default"))
                        .collect::<Result<_, _>>()?,
                )
            } else {
                parse_literal(&kind, default, label, "default")?
            };
            schema.default = Some(value);
        }
        Ok(Arc::new(schema))
    }
}

/// Kind used to parse declared literals; a reference wrapper takes its target's kind.
fn literal_kind(schema: &Schema, base: &Schema) -> SchemaKind {
    match &schema.kind {
        SchemaKind::Ref { .. } if !matches!(base.kind, SchemaKind::Ref { .. }) => {
            base.kind.clone()
        }
        kind => kind.clone(),
    }
}

fn has_scalar_constraints(tags: &Tags) -> bool {
    tags.min_length.is_some()
        || tags.max_length.is_some()
        || tags.minimum.is_some()
        || tags.maximum.is_some()
        || tags.exclusive_minimum.is_some()
        || tags.exclusive_maximum.is_some()
        || tags.pattern.is_some()
        || !tags.enum_values.is_empty()
}

fn apply_constraints(
    c: &mut Constraints,
    kind: &SchemaKind,
    tags: &Tags,
    label: &str,
) -> Result<(), SchemaError> {
    c.min_length = tags.min_length.or(c.min_length);
    c.max_length = tags.max_length.or(c.max_length);
    c.minimum = tags.minimum.or(c.minimum);
    c.maximum = tags.maximum.or(c.maximum);
    c.exclusive_minimum = tags.exclusive_minimum.or(c.exclusive_minimum);
    c.exclusive_maximum = tags.exclusive_maximum.or(c.exclusive_maximum);
    c.min_items = tags.min_items.or(c.min_items);
    c.max_items = tags.max_items.or(c.max_items);
    if let Some(pattern) = tags.pattern {
        c.pattern = Some(
            Pattern::new(pattern).map_err(|source| SchemaError::InvalidPattern {
                field: label.to_string(),
                pattern: pattern.to_string(),
                source,
            })?,
        );
    }
    if !tags.enum_values.is_empty() {
        c.enum_values = tags
            .enum_values
            .iter()
            .map(|v| parse_literal(kind, v, label, "enum value"))
            .collect::<Result<_, _>>()?;
    }
    Ok(())
}

/// Parse a declared literal (default or enum member) as a value of `kind`.
pub(crate) fn parse_literal(
    kind: &SchemaKind,
    raw: &str,
    label: &str,
    what: &'static str,
) -> Result<Value, SchemaError> {
    let invalid = || SchemaError::InvalidLiteral {
        field: label.to_string(),
        what,
        value: raw.to_string(),
    };
    match kind {
        SchemaKind::Integer => raw
            .parse::<i64>()
            .map(Value::from)
            .or_else(|_| raw.parse::<u64>().map(Value::from))
            .map_err(|_| invalid()),
        SchemaKind::Number => raw
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(invalid),
        SchemaKind::Boolean => raw.parse::<bool>().map(Value::Bool).map_err(|_| invalid()),
        _ => Ok(Value::String(raw.to_string())),
    }
}

fn scalar_schema(kind: ScalarKind) -> Schema {
    match kind {
        ScalarKind::Bool => Schema::boolean(),
        ScalarKind::Integer { signed, bits } => {
            let mut s = Schema::integer();
            s.format = match (signed, bits) {
                (true, 32) => Some("int32".into()),
                (true, 64) => Some("int64".into()),
                _ => None,
            };
            if !signed {
                s.constraints.minimum = Some(0.0);
            }
            s
        }
        ScalarKind::Float { bits } => {
            let mut s = Schema::number();
            s.format = Some(if bits == 32 { "float" } else { "double" }.into());
            s
        }
        ScalarKind::String => Schema::string(),
        ScalarKind::DateTime => {
            let mut s = Schema::string();
            s.format = Some("date-time".into());
            s
        }
        ScalarKind::Date => {
            let mut s = Schema::string();
            s.format = Some("date".into());
            s
        }
    }
}

fn nullable(inner: &SchemaRef) -> Schema {
    match inner.ref_name() {
        Some(name) => {
            let output = match &inner.kind {
                SchemaKind::Ref { output, .. } => *output,
                _ => inner
                    .properties
                    .first()
                    .is_some_and(|(k, _)| k == SCHEMA_PROPERTY),
            };
            let mut schema = Schema::reference(name, output);
            schema.nullable = true;
            schema
        }
        None => {
            let mut schema = (**inner).clone();
            schema.nullable = true;
            schema
        }
    }
}

fn rewrite_self_refs(doc: Value, root: &str) -> Value {
    let target = format!("#/$defs/{root}");
    fn walk(value: Value, target: &str) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(k, v)| {
                        if k == "$ref" && v.as_str() == Some(target) {
                            (k, json!("#"))
                        } else {
                            (k, walk(v, target))
                        }
                    })
                    .collect(),
            ),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|v| walk(v, target)).collect())
            }
            other => other,
        }
    }
    walk(doc, &target)
}

fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Derive a schema name from a Rust type name.
///
/// Module paths are stripped and generic arguments are folded into the name:
/// `my_app::models::Page<my_app::Item>` becomes `PageItem`. Characters that are
/// not alphanumeric are dropped.
#[must_use]
pub fn default_schema_namer(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len());
    for part in type_name.split(|c: char| matches!(c, '<' | '>' | ',' | ' ' | '&' | '[' | ']' | ';' | '(' | ')')) {
        let Some(last) = part.rsplit("::").next() else {
            continue;
        };
        if last.is_empty() || last == "'static" {
            continue;
        }
        out.push_str(&upper_first(last));
    }
    out.retain(|c| c.is_ascii_alphanumeric());
    out
}
