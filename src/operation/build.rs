use super::types::{BodyMeta, Operation, OperationMeta, ParamMeta, ResponseShape, ShapeKind};
use crate::binder::coerce_scalar;
use crate::config::BindConfig;
use crate::error::RegistrationError;
use crate::router::path_param_names;
use crate::schema::{
    FieldDescription, FieldRole, ScalarKind, SchemaRef, SchemaRegistry, TypeDescription, TypeRef,
};
use crate::typed::{Input, Output, ShapeBody};
use crate::validator::Validator;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

/// Derive the immutable descriptor for an operation.
///
/// All schemas, defaults and header allowlists are checked here so request
/// handling never meets a malformed declaration.
pub(crate) fn build_operation<I: Input, O: Output>(
    op: Operation,
    registry: &mut SchemaRegistry,
    config: &BindConfig,
) -> Result<OperationMeta, RegistrationError> {
    let operation_id = op
        .operation_id
        .clone()
        .unwrap_or_else(|| default_operation_id(&op.method, &op.path));
    let type_name = camel_case(&operation_id);
    let default_status = op.default_status.unwrap_or(config.default_status);

    let fields = match I::describe() {
        TypeDescription::Struct(desc) => desc.fields,
        TypeDescription::Unit => Vec::new(),
        _ => {
            return Err(RegistrationError::UnsupportedInput {
                type_name: std::any::type_name::<I>(),
            })
        }
    };

    let mut params = Vec::new();
    let mut body: Option<BodyMeta> = None;
    for field in &fields {
        match field.role {
            FieldRole::Path | FieldRole::Query | FieldRole::Header => {
                let param = param_meta(field, registry)?;
                debug!(
                    operation_id = %operation_id,
                    location = %param.location,
                    kind = ?param.kind,
                    list = param.list,
                    required = param.required,
                    "Parameter bound"
                );
                params.push(param);
            }
            FieldRole::Body => {
                let hint = format!("{type_name}Request");
                let base = registry.schema_for(field.ty, false, &hint)?;
                let schema = registry.field_schema(base, field, "body")?;
                let meta = body.get_or_insert_with(BodyMeta::empty);
                meta.schema_name = schema.ref_name().map(str::to_string);
                meta.schema = Some(schema);
                meta.required = field.required;
                meta.decode = true;
                meta.content_type = meta.content_type.or(field.content_type);
            }
            FieldRole::RawBody => {
                let meta = body.get_or_insert_with(BodyMeta::empty);
                meta.raw = true;
                meta.required |= field.required;
                meta.content_type = meta.content_type.or(field.content_type);
            }
            FieldRole::Property => {
                return Err(RegistrationError::UnboundInputField { field: field.name })
            }
        }
    }

    if let Some(schema) = op.body_schema {
        let meta = body.get_or_insert_with(BodyMeta::empty);
        meta.schema_name = schema.name.clone();
        meta.schema = Some(Arc::new(schema));
    }
    if let (Some(meta), Some(required)) = (body.as_mut(), op.body_required) {
        meta.required = required;
    }

    for name in path_param_names(&op.path)? {
        let bound = params
            .iter()
            .any(|p| p.role == FieldRole::Path && p.name == name);
        if !bound {
            return Err(RegistrationError::UnboundPathParameter {
                path: op.path.clone(),
                name: name.to_string(),
            });
        }
    }

    let output = O::describe_output();
    let mut shapes = Vec::with_capacity(output.shapes.len());
    for (index, shape) in output.shapes.iter().enumerate() {
        if let Some(allowed) = shape.headers {
            if let Some(missing) = allowed
                .iter()
                .find(|h| !output.headers.iter().any(|d| d.eq_ignore_ascii_case(h)))
            {
                return Err(RegistrationError::UndeclaredHeader {
                    shape: index,
                    header: (*missing).to_string(),
                });
            }
        }
        let status = shape.status.unwrap_or(match shape.body {
            ShapeBody::Empty => op.default_status.unwrap_or(204),
            _ => op.default_status.unwrap_or(200),
        });
        let body = match shape.body {
            ShapeBody::Empty => ShapeKind::Empty,
            ShapeBody::Raw => ShapeKind::Raw,
            ShapeBody::Structured(ty) => {
                let hint = format!("{type_name}Response{status}");
                let schema = registry.schema_for(ty, true, &hint)?;
                ShapeKind::Structured {
                    schema_name: schema.ref_name().map(str::to_string),
                    schema,
                }
            }
        };
        shapes.push(ResponseShape {
            status,
            headers: shape.headers.map(<[&'static str]>::to_vec),
            body,
            content_type: shape.content_type,
        });
    }

    info!(
        operation_id = %operation_id,
        method = %op.method,
        path = %op.path,
        params = params.len(),
        has_body = body.is_some(),
        shapes = shapes.len(),
        "Operation described"
    );

    Ok(OperationMeta {
        operation_id,
        method: op.method,
        path_pattern: op.path,
        summary: op.summary,
        tags: op.tags,
        params,
        body,
        headers: output.headers,
        shapes,
        default_status,
        max_body_bytes: op.max_body_bytes.unwrap_or(config.max_body_bytes),
        dynamic_status: output.dynamic_status,
    })
}

impl BodyMeta {
    fn empty() -> Self {
        Self {
            schema: None,
            schema_name: None,
            required: false,
            decode: false,
            raw: false,
            content_type: None,
        }
    }
}

fn param_meta(
    field: &FieldDescription,
    registry: &mut SchemaRegistry,
) -> Result<ParamMeta, RegistrationError> {
    let location = field.location();
    let unsupported = || RegistrationError::UnsupportedParameter {
        location: location.clone(),
        type_name: field.ty.type_name,
    };

    let (desc, optional) = match unwrap_boxed(field.ty).describe() {
        TypeDescription::Optional(inner) => (unwrap_boxed(inner).describe(), true),
        other => (other, false),
    };
    let (kind, list, enum_values) = match desc {
        TypeDescription::Scalar(kind) => (kind, false, None),
        TypeDescription::Enum { values, .. } => (ScalarKind::String, false, Some(values)),
        TypeDescription::List(inner) => match unwrap_boxed(inner).describe() {
            TypeDescription::Scalar(kind) => (kind, true, None),
            TypeDescription::Enum { values, .. } => (ScalarKind::String, true, Some(values)),
            _ => return Err(unsupported()),
        },
        _ => return Err(unsupported()),
    };

    let schema: Option<SchemaRef> = if field.tags.has_constraints() || enum_values.is_some() {
        let base = registry.schema_for(field.ty, false, &location)?;
        Some(registry.field_schema(base, field, &location)?)
    } else {
        None
    };

    let header = field.role == FieldRole::Header;
    let time_format = field.tags.time_format;
    let default = match field.default {
        None => None,
        Some(raw) => {
            let invalid = |message: String| RegistrationError::InvalidDefault {
                location: location.clone(),
                value: raw.to_string(),
                message,
            };
            let value = if list {
                Value::Array(
                    raw.split(',')
                        .map(|part| coerce_scalar(kind, part, time_format, header))
                        .collect::<Result<_, _>>()
                        .map_err(|m| invalid(m.to_string()))?,
                )
            } else {
                coerce_scalar(kind, raw, time_format, header).map_err(|m| invalid(m.to_string()))?
            };
            if let Some(schema) = &schema {
                let problems = Validator::new(registry).validate_at(schema, &value, &location);
                if let Some(first) = problems.into_iter().next() {
                    return Err(invalid(first.message));
                }
            }
            Some(value)
        }
    };

    let zero = if list {
        json!([])
    } else {
        match enum_values.and_then(|values| values.first()) {
            Some(first) => json!(first),
            None => zero_value(kind),
        }
    };

    Ok(ParamMeta {
        name: field.name,
        role: field.role,
        location,
        kind,
        list,
        optional,
        required: field.required,
        default,
        zero,
        time_format,
        schema,
        type_name: field.ty.type_name,
    })
}

fn unwrap_boxed(ty: TypeRef) -> TypeRef {
    match ty.describe() {
        TypeDescription::Boxed(inner) => unwrap_boxed(inner),
        _ => ty,
    }
}

fn zero_value(kind: ScalarKind) -> Value {
    match kind {
        ScalarKind::Bool => json!(false),
        ScalarKind::Integer { .. } => json!(0),
        ScalarKind::Float { .. } => json!(0.0),
        ScalarKind::String => json!(""),
        ScalarKind::DateTime => json!("1970-01-01T00:00:00Z"),
        ScalarKind::Date => json!("1970-01-01"),
    }
}

/// Operation id from method and path: `PUT /errors/{id}` becomes `put-errors-by-id`.
#[must_use]
pub fn default_operation_id(method: &http::Method, path: &str) -> String {
    let mut parts = vec![method.as_str().to_ascii_lowercase()];
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => {
                parts.push("by".to_string());
                parts.push(slug(name));
            }
            None => parts.push(slug(segment)),
        }
    }
    parts.retain(|p| !p.is_empty());
    parts.join("-")
}

fn slug(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}

fn camel_case(id: &str) -> String {
    id.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_default_operation_id() {
        assert_eq!(
            default_operation_id(&Method::PUT, "/errors/{id}"),
            "put-errors-by-id"
        );
        assert_eq!(
            default_operation_id(&Method::GET, "/user_profiles/{user-id}/avatar.png"),
            "get-user-profiles-by-user-id-avatar-png"
        );
        assert_eq!(default_operation_id(&Method::GET, "/"), "get");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("put-errors-by-id"), "PutErrorsById");
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(zero_value(ScalarKind::Bool), json!(false));
        assert_eq!(zero_value(ScalarKind::Integer { signed: false, bits: 8 }), json!(0));
        assert_eq!(zero_value(ScalarKind::String), json!(""));
    }
}
