use crate::schema::{FieldRole, ScalarKind, Schema, SchemaRef};
use http::Method;
use serde_json::Value;

/// Declaration of an operation, passed to [`Api::register`](crate::server::Api::register).
///
/// ```rust
/// use brrtbind::operation::Operation;
///
/// let op = Operation::put("/errors/{id}").summary("Update an item");
/// assert_eq!(op.path, "/errors/{id}");
/// ```
#[derive(Debug, Clone)]
pub struct Operation {
    /// Generated from method and path when absent, e.g. `put-errors-by-id`.
    pub operation_id: Option<String>,
    pub method: Method,
    /// Path pattern with `{name}` placeholders.
    pub path: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    /// Status used by shapes without an explicit status and when no shape is present.
    pub default_status: Option<u16>,
    /// Overrides the global body limit.
    pub max_body_bytes: Option<usize>,
    /// Explicit request body schema, replacing the one derived from the input type.
    pub body_schema: Option<Schema>,
    pub body_required: Option<bool>,
}

impl Operation {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            operation_id: None,
            method,
            path: path.into(),
            summary: None,
            tags: Vec::new(),
            default_status: None,
            max_body_bytes: None,
            body_schema: None,
            body_required: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    #[must_use]
    pub fn default_status(mut self, status: u16) -> Self {
        self.default_status = Some(status);
        self
    }

    #[must_use]
    pub fn max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = Some(limit);
        self
    }

    /// Validate the payload against `schema`; combine with a raw body field
    /// to accept documents the input type cannot express, such as a `oneOf`.
    #[must_use]
    pub fn body_schema(mut self, schema: Schema) -> Self {
        self.body_schema = Some(schema);
        self
    }

    #[must_use]
    pub fn body_required(mut self, required: bool) -> Self {
        self.body_required = Some(required);
        self
    }
}

/// Binding plan for one path, query or header parameter.
#[derive(Debug, Clone)]
pub struct ParamMeta {
    /// Wire name (`id`, `limit`, `If-Match`).
    pub name: &'static str,
    pub role: FieldRole,
    /// Error location and bound-input key, e.g. `query.limit`.
    pub location: String,
    pub kind: ScalarKind,
    /// Comma-separated list of `kind` values.
    pub list: bool,
    /// Field is an `Option`; absent values bind to `null`.
    pub optional: bool,
    pub required: bool,
    /// Declared default, already coerced.
    pub default: Option<Value>,
    /// Value bound when absent without default, or after a failed parse.
    pub zero: Value,
    pub time_format: Option<&'static str>,
    /// Present only when the field declares constraints or is an enumeration.
    pub schema: Option<SchemaRef>,
    pub type_name: &'static str,
}

/// Binding plan for the request body.
#[derive(Debug, Clone)]
pub struct BodyMeta {
    /// Validation schema; `None` for raw-only inputs without an explicit schema.
    pub schema: Option<SchemaRef>,
    pub schema_name: Option<String>,
    pub required: bool,
    /// A structured body field is decoded.
    pub decode: bool,
    /// A raw body field receives the payload bytes.
    pub raw: bool,
    pub content_type: Option<&'static str>,
}

/// Body of a declared response shape.
#[derive(Debug, Clone)]
pub enum ShapeKind {
    Empty,
    Structured {
        schema: SchemaRef,
        schema_name: Option<String>,
    },
    Raw,
}

/// One declared response shape.
#[derive(Debug, Clone)]
pub struct ResponseShape {
    pub status: u16,
    /// Header names this shape may write; `None` allows every declared header.
    pub headers: Option<Vec<&'static str>>,
    pub body: ShapeKind,
    pub content_type: Option<&'static str>,
}

impl ResponseShape {
    #[must_use]
    pub fn allows_header(&self, name: &str) -> bool {
        self.headers
            .as_ref()
            .map_or(true, |list| list.iter().any(|h| h.eq_ignore_ascii_case(name)))
    }
}

/// Immutable per-operation descriptor, shared by every request.
#[derive(Debug, Clone)]
pub struct OperationMeta {
    pub operation_id: String,
    pub method: Method,
    pub path_pattern: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub params: Vec<ParamMeta>,
    pub body: Option<BodyMeta>,
    /// Header names declared by the output type.
    pub headers: Vec<&'static str>,
    pub shapes: Vec<ResponseShape>,
    pub default_status: u16,
    pub max_body_bytes: usize,
    /// The output carries a status field overriding shape statuses.
    pub dynamic_status: bool,
}

impl OperationMeta {
    /// Every parameter, body and response schema in declaration order.
    pub fn schemas(&self) -> impl Iterator<Item = &SchemaRef> {
        let params = self.params.iter().filter_map(|p| p.schema.as_ref());
        let body = self.body.as_ref().and_then(|b| b.schema.as_ref());
        let shapes = self.shapes.iter().filter_map(|s| match &s.body {
            ShapeKind::Structured { schema, .. } => Some(schema),
            _ => None,
        });
        params.chain(body).chain(shapes)
    }

    /// Named schemas this operation exposes.
    pub fn schema_names(&self) -> impl Iterator<Item = &str> {
        let body = self.body.as_ref().and_then(|b| b.schema_name.as_deref());
        let shapes = self.shapes.iter().filter_map(|s| match &s.body {
            ShapeKind::Structured { schema_name, .. } => schema_name.as_deref(),
            _ => None,
        });
        body.into_iter().chain(shapes)
    }
}
