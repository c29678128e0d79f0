use super::path::{PathBuffer, Segment};
use crate::error::ErrorDetail;
use crate::schema::{
    AdditionalProperties, Combinator, Constraints, Schema, SchemaKind, SchemaRegistry,
    SCHEMA_PROPERTY,
};
use serde_json::{Map, Number, Value};
use tracing::{debug, error};

/// Exhaustive schema validator.
///
/// Walks a [`Schema`] against a decoded value and records every violation
/// with its structural location. Validation never stops at the first error.
///
/// `oneOf` with several matching variants is accepted unless
/// [`Validator::strict_one_of`] is enabled.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'r> {
    registry: &'r SchemaRegistry,
    strict_one_of: bool,
}

impl<'r> Validator<'r> {
    #[must_use]
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self {
            registry,
            strict_one_of: false,
        }
    }

    /// Reject `oneOf` values that match more than one variant.
    #[must_use]
    pub fn strict_one_of(mut self, strict: bool) -> Self {
        self.strict_one_of = strict;
        self
    }

    /// Validate `value` with locations rooted at `root`.
    #[must_use]
    pub fn validate_at(&self, schema: &Schema, value: &Value, root: &str) -> Vec<ErrorDetail> {
        let mut errors = Vec::new();
        let mut path = PathBuffer::from_root(root);
        self.validate(schema, value, &mut path, &mut errors);
        errors
    }

    /// Validate `value` at `path`, appending every violation to `errors`.
    pub fn validate(
        &self,
        schema: &Schema,
        value: &Value,
        path: &mut PathBuffer,
        errors: &mut Vec<ErrorDetail>,
    ) {
        if value.is_null() && schema.nullable {
            return;
        }
        match &schema.kind {
            SchemaKind::Any => {}
            SchemaKind::Ref { name, output } => match self.registry.lookup(name, *output) {
                Some(target) => {
                    self.validate(&target, value, path, errors);
                    self.check_refined(schema, value, path, errors);
                }
                None => {
                    error!(schema_name = %name, "Unresolved schema reference");
                    errors.push(
                        ErrorDetail::at(path.as_str(), format!("unresolved schema reference {name}"))
                            .with_value(value.clone()),
                    );
                }
            },
            SchemaKind::Boolean => match value {
                Value::Bool(_) => self.check_enum(&schema.constraints, value, path, errors),
                _ => type_error("boolean", value, path, errors),
            },
            SchemaKind::Integer => match value {
                Value::Number(n) if is_integer(n) => {
                    check_number(n, &schema.constraints, value, path, errors);
                    self.check_enum(&schema.constraints, value, path, errors);
                }
                _ => type_error("integer", value, path, errors),
            },
            SchemaKind::Number => match value {
                Value::Number(n) => {
                    check_number(n, &schema.constraints, value, path, errors);
                    self.check_enum(&schema.constraints, value, path, errors);
                }
                _ => type_error("number", value, path, errors),
            },
            SchemaKind::String => match value {
                Value::String(s) => {
                    check_string(s, schema, value, path, errors);
                    self.check_enum(&schema.constraints, value, path, errors);
                }
                _ => type_error("string", value, path, errors),
            },
            SchemaKind::Array => match value {
                Value::Array(items) => self.check_array(schema, items, value, path, errors),
                _ => type_error("array", value, path, errors),
            },
            SchemaKind::Object => match value {
                Value::Object(map) => self.check_object(schema, map, path, errors),
                _ => type_error("object", value, path, errors),
            },
            SchemaKind::Union(combinator) => {
                self.check_union(*combinator, schema, value, path, errors)
            }
        }
    }

    /// Constraints declared on a field next to a reference to its named type.
    fn check_refined(
        &self,
        schema: &Schema,
        value: &Value,
        path: &mut PathBuffer,
        errors: &mut Vec<ErrorDetail>,
    ) {
        match value {
            Value::String(s) => check_string(s, schema, value, path, errors),
            Value::Number(n) => check_number(n, &schema.constraints, value, path, errors),
            Value::Array(items) => self.check_array(schema, items, value, path, errors),
            _ => {}
        }
        self.check_enum(&schema.constraints, value, path, errors);
    }

    fn check_enum(
        &self,
        c: &Constraints,
        value: &Value,
        path: &PathBuffer,
        errors: &mut Vec<ErrorDetail>,
    ) {
        if c.enum_values.is_empty() || c.enum_values.iter().any(|e| values_equal(e, value)) {
            return;
        }
        let allowed: Vec<String> = c
            .enum_values
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect();
        errors.push(
            ErrorDetail::at(
                path.as_str(),
                format!("expected value to be one of \"{}\"", allowed.join(", ")),
            )
            .with_value(value.clone()),
        );
    }

    fn check_array(
        &self,
        schema: &Schema,
        items: &[Value],
        value: &Value,
        path: &mut PathBuffer,
        errors: &mut Vec<ErrorDetail>,
    ) {
        let c = &schema.constraints;
        let len = items.len() as u64;
        if let Some(min) = c.min_items {
            if len < min {
                errors.push(
                    ErrorDetail::at(path.as_str(), format!("expected array length >= {min}"))
                        .with_value(value.clone()),
                );
            }
        }
        if let Some(max) = c.max_items {
            if len > max {
                errors.push(
                    ErrorDetail::at(path.as_str(), format!("expected array length <= {max}"))
                        .with_value(value.clone()),
                );
            }
        }
        if let Some(item_schema) = &schema.items {
            for (index, item) in items.iter().enumerate() {
                let mut guard = path.push(Segment::Index(index));
                self.validate(item_schema, item, &mut guard, errors);
            }
        }
    }

    fn check_object(
        &self,
        schema: &Schema,
        map: &Map<String, Value>,
        path: &mut PathBuffer,
        errors: &mut Vec<ErrorDetail>,
    ) {
        for (key, property) in &schema.properties {
            if key == SCHEMA_PROPERTY {
                continue;
            }
            match map.get(key) {
                Some(member) => {
                    let mut guard = path.push(Segment::Key(key));
                    self.validate(property, member, &mut guard, errors);
                }
                None if schema.is_required(key) => {
                    errors.push(ErrorDetail::at(path.with(key), "required property is missing"));
                }
                None => {}
            }
        }

        let undeclared = map
            .iter()
            .filter(|(k, _)| k.as_str() != SCHEMA_PROPERTY && schema.property(k).is_none());
        match &schema.additional_properties {
            AdditionalProperties::Allow => {}
            AdditionalProperties::Deny => {
                for (key, member) in undeclared {
                    errors.push(
                        ErrorDetail::at(path.with(key), "unexpected property")
                            .with_value(member.clone()),
                    );
                }
            }
            AdditionalProperties::Schema(extra) => {
                for (key, member) in undeclared {
                    let mut guard = path.push(Segment::Key(key));
                    self.validate(extra, member, &mut guard, errors);
                }
            }
        }
    }

    fn check_union(
        &self,
        combinator: Combinator,
        schema: &Schema,
        value: &Value,
        path: &mut PathBuffer,
        errors: &mut Vec<ErrorDetail>,
    ) {
        let mut matched = 0usize;
        let mut first_errors = Vec::with_capacity(schema.variants.len());
        for variant in &schema.variants {
            let mut scratch = Vec::new();
            self.validate(variant, value, path, &mut scratch);
            match scratch.into_iter().next() {
                None => matched += 1,
                Some(first) => first_errors.push(first),
            }
        }
        if matched == 0 {
            errors.extend(first_errors);
            return;
        }
        if combinator == Combinator::OneOf && matched > 1 {
            if self.strict_one_of {
                errors.push(
                    ErrorDetail::at(
                        path.as_str(),
                        format!("expected value to match exactly one schema but matched {matched}"),
                    )
                    .with_value(value.clone()),
                );
            } else {
                debug!(
                    location = %path,
                    matched,
                    "oneOf value matched several variants, accepting"
                );
            }
        }
    }
}

fn type_error(expected: &str, value: &Value, path: &PathBuffer, errors: &mut Vec<ErrorDetail>) {
    errors.push(ErrorDetail::at(path.as_str(), format!("expected {expected}")).with_value(value.clone()));
}

fn is_integer(n: &Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
}

fn check_number(
    n: &Number,
    c: &Constraints,
    value: &Value,
    path: &PathBuffer,
    errors: &mut Vec<ErrorDetail>,
) {
    let Some(v) = n.as_f64() else {
        return;
    };
    let mut fail = |message: String| {
        errors.push(ErrorDetail::at(path.as_str(), message).with_value(value.clone()));
    };
    if let Some(min) = c.minimum {
        if v < min {
            fail(format!("expected number >= {}", format_number(min)));
        }
    }
    if let Some(min) = c.exclusive_minimum {
        if v <= min {
            fail(format!("expected number > {}", format_number(min)));
        }
    }
    if let Some(max) = c.maximum {
        if v > max {
            fail(format!("expected number <= {}", format_number(max)));
        }
    }
    if let Some(max) = c.exclusive_maximum {
        if v >= max {
            fail(format!("expected number < {}", format_number(max)));
        }
    }
}

fn check_string(
    s: &str,
    schema: &Schema,
    value: &Value,
    path: &PathBuffer,
    errors: &mut Vec<ErrorDetail>,
) {
    let c = &schema.constraints;
    let mut fail = |message: String| {
        errors.push(ErrorDetail::at(path.as_str(), message).with_value(value.clone()));
    };
    if c.min_length.is_some() || c.max_length.is_some() {
        let len = s.chars().count() as u64;
        if let Some(min) = c.min_length {
            if len < min {
                fail(format!("expected length >= {min}"));
            }
        }
        if let Some(max) = c.max_length {
            if len > max {
                fail(format!("expected length <= {max}"));
            }
        }
    }
    if let Some(pattern) = &c.pattern {
        if !pattern.regex.is_match(s) {
            fail(format!("expected string to match pattern {}", pattern.source));
        }
    }
    match schema.format.as_deref() {
        Some("date-time") if chrono::DateTime::parse_from_rfc3339(s).is_err() => {
            fail("expected string to be RFC 3339 date-time".to_string());
        }
        Some("date") if chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_err() => {
            fail("expected string to be RFC 3339 full-date".to_string());
        }
        _ => {}
    }
}

/// Render a bound without a trailing `.0` for whole numbers.
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Pattern;
    use serde_json::json;
    use std::sync::Arc;

    fn messages(errors: &[ErrorDetail]) -> Vec<(&str, &str)> {
        errors
            .iter()
            .map(|e| (e.location.as_deref().unwrap_or(""), e.message.as_str()))
            .collect()
    }

    #[test]
    fn test_collects_every_violation() {
        let registry = SchemaRegistry::new();
        let mut name = Schema::string();
        name.constraints.max_length = Some(10);
        let mut count = Schema::integer();
        count.constraints.minimum = Some(1.0);
        let schema = Schema::object([("name", name), ("count", count), ("tag", Schema::string())]);

        let errors = Validator::new(&registry).validate_at(
            &schema,
            &json!({"name": "12345678901", "count": 0}),
            "body",
        );
        assert_eq!(
            messages(&errors),
            vec![
                ("body.name", "expected length <= 10"),
                ("body.count", "expected number >= 1"),
                ("body.tag", "required property is missing"),
            ]
        );
        assert_eq!(errors[1].value, Some(json!(0)));
    }

    #[test]
    fn test_nested_array_locations() {
        let registry = SchemaRegistry::new();
        let mut field2 = Schema::string();
        field2.constraints.min_length = Some(5);
        let item = Schema::object([("field2", field2)]);
        let mut field1 = Schema::of_kind(SchemaKind::Object);
        field1.additional_properties =
            AdditionalProperties::Schema(Arc::new(Schema::array(item)));
        let schema = Schema::object([("field1", field1)]);

        let errors = Validator::new(&registry).validate_at(
            &schema,
            &json!({"field1": {"foo": [{"field2": "bar"}]}}),
            "body",
        );
        assert_eq!(
            messages(&errors),
            vec![("body.field1.foo[0].field2", "expected length >= 5")]
        );
    }

    #[test]
    fn test_schema_member_is_ignored() {
        let registry = SchemaRegistry::new();
        let mut schema = Schema::object([("name", Schema::string())]);
        schema.additional_properties = AdditionalProperties::Deny;
        let errors = Validator::new(&registry).validate_at(
            &schema,
            &json!({"$schema": "https://example.com/schemas/X.json", "name": "foo", "extra": 1}),
            "body",
        );
        assert_eq!(messages(&errors), vec![("body.extra", "unexpected property")]);
    }

    #[test]
    fn test_type_and_constraint_messages() {
        let registry = SchemaRegistry::new();
        let v = Validator::new(&registry);

        let mut s = Schema::string();
        s.constraints.pattern = Some(Pattern::new("^[a-z]+$").unwrap());
        s.constraints.enum_values = vec![json!("abc"), json!("def")];
        let errors = v.validate_at(&s, &json!("XYZ"), "query.kind");
        assert_eq!(
            messages(&errors),
            vec![
                ("query.kind", "expected string to match pattern ^[a-z]+$"),
                ("query.kind", "expected value to be one of \"abc, def\""),
            ]
        );

        let mut n = Schema::number();
        n.constraints.exclusive_maximum = Some(2.5);
        let errors = v.validate_at(&n, &json!(2.5), "body");
        assert_eq!(messages(&errors), vec![("body", "expected number < 2.5")]);

        let errors = v.validate_at(&Schema::integer(), &json!(1.5), "body");
        assert_eq!(messages(&errors), vec![("body", "expected integer")]);

        let mut a = Schema::array(Schema::boolean());
        a.constraints.max_items = Some(1);
        let errors = v.validate_at(&a, &json!([true, "x"]), "body");
        assert_eq!(
            messages(&errors),
            vec![
                ("body", "expected array length <= 1"),
                ("body[1]", "expected boolean"),
            ]
        );
    }

    #[test]
    fn test_one_of_permissive_and_strict() {
        let registry = SchemaRegistry::new();
        let schema = Schema::one_of([Schema::any(), Schema::string()]);

        let lenient = Validator::new(&registry);
        assert!(lenient.validate_at(&schema, &json!("x"), "body").is_empty());

        let strict = Validator::new(&registry).strict_one_of(true);
        let errors = strict.validate_at(&schema, &json!("x"), "body");
        assert_eq!(
            messages(&errors),
            vec![("body", "expected value to match exactly one schema but matched 2")]
        );

        let none = Schema::one_of([Schema::string(), Schema::integer()]);
        let errors = lenient.validate_at(&none, &json!(true), "body");
        assert_eq!(
            messages(&errors),
            vec![("body", "expected string"), ("body", "expected integer")]
        );
    }

    #[test]
    fn test_nullable_accepts_null() {
        let registry = SchemaRegistry::new();
        let mut s = Schema::string();
        s.nullable = true;
        assert!(Validator::new(&registry)
            .validate_at(&s, &Value::Null, "body")
            .is_empty());
    }

    #[test]
    fn test_unresolved_reference_is_reported() {
        let registry = SchemaRegistry::new();
        let errors = Validator::new(&registry).validate_at(
            &Schema::reference("Missing", false),
            &json!({"a": 1}),
            "body",
        );
        assert_eq!(
            messages(&errors),
            vec![("body", "unresolved schema reference Missing")]
        );
    }
}
