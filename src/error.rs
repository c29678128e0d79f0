//! Error types shared by binding, validation and dispatch.
//!
//! Three families live here:
//!
//! - [`ErrorDetail`] / [`ErrorModel`]: the wire shape of every error response
//! - [`ApiError`] / [`StatusError`]: request-time failures mapped to a status code
//! - [`SchemaError`] / [`RegistrationError`]: startup failures returned from
//!   [`Api::register`](crate::server::Api::register)

use crate::schema::{
    Describe, FieldDescription, FieldRole, StructDescription, Tags, TypeDescription, TypeRef,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Status written when the caller abandoned the request before a response was produced.
pub const STATUS_CLIENT_CLOSED: u16 = 499;

/// A single problem found while binding or validating a request.
///
/// `location` is a dotted structural path such as `body.items[2].name` or
/// `query.limit`. `value` echoes the offending input when it is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl ErrorDetail {
    /// Create a detail with only a message; the resolver walk fills in the location.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
            value: None,
        }
    }

    /// Create a detail anchored at `location`.
    pub fn at(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: Some(location.into()),
            value: None,
        }
    }

    /// Attach the offending input value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{} ({})", self.message, loc)?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(value) = &self.value {
            write!(f, ": {value}")?;
        }
        Ok(())
    }
}

/// Body written for every error response.
///
/// Field order is the wire order: `$schema`, `title`, `status`, `detail`, `errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorModel {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorDetail>,
}

impl ErrorModel {
    /// Build a model for `status` with the canonical reason phrase as title.
    #[must_use]
    pub fn new(status: u16, detail: Option<String>, errors: Vec<ErrorDetail>) -> Self {
        Self {
            schema: None,
            title: reason_phrase(status).to_string(),
            status,
            detail,
            errors,
        }
    }
}

impl Describe for ErrorDetail {
    fn describe() -> TypeDescription {
        TypeDescription::Struct(StructDescription {
            schema_name: Some("ErrorDetail"),
            doc: Some("A single problem found while processing a request."),
            deny_unknown: false,
            fields: vec![
                FieldDescription::property("message", TypeRef::of::<String>())
                    .doc("Human readable description of the problem."),
                FieldDescription::property("location", TypeRef::of::<Option<String>>())
                    .optional()
                    .doc("Structural path of the offending input, e.g. body.items[2].name."),
                FieldDescription::property("value", TypeRef::of::<Option<Value>>())
                    .optional()
                    .doc("The offending input value."),
            ],
        })
    }
}

impl Describe for ErrorModel {
    fn describe() -> TypeDescription {
        TypeDescription::Struct(StructDescription {
            schema_name: Some("ErrorModel"),
            doc: Some("Error response body."),
            deny_unknown: false,
            fields: vec![
                FieldDescription::property("title", TypeRef::of::<String>())
                    .doc("Short summary of the problem type."),
                FieldDescription::property("status", TypeRef::of::<u16>()).tags(Tags {
                    minimum: Some(100.0),
                    maximum: Some(599.0),
                    ..Tags::EMPTY
                }),
                FieldDescription::property("detail", TypeRef::of::<Option<String>>()).optional(),
                FieldDescription::property("errors", TypeRef::of::<Vec<ErrorDetail>>()).optional(),
            ],
        })
    }
}

/// Canonical reason phrase for `status`, falling back to a class description.
#[must_use]
pub fn reason_phrase(status: u16) -> &'static str {
    if status == STATUS_CLIENT_CLOSED {
        return "Client Closed Request";
    }
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or(match status / 100 {
            1 => "Informational",
            2 => "Success",
            3 => "Redirection",
            4 => "Client Error",
            _ => "Server Error",
        })
}

/// A failure with an explicit HTTP status, usable from handlers and resolvers.
///
/// ```rust
/// use brrtbind::error::StatusError;
///
/// let err = StatusError::forbidden("nope");
/// assert_eq!(err.status, 403);
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct StatusError {
    pub status: u16,
    pub message: String,
    pub details: Vec<ErrorDetail>,
}

impl StatusError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Attach additional details to the response body.
    #[must_use]
    pub fn with_details(mut self, details: Vec<ErrorDetail>) -> Self {
        self.details = details;
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(403, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(409, message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(422, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(500, message)
    }
}

/// Request-time failure kinds.
///
/// Only [`ApiError::ValidationFailed`] carries several details; every other
/// kind renders a single entry.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The payload could not be decoded at all (syntax error, missing required body).
    #[error("malformed payload: {}", .0.message)]
    MalformedPayload(ErrorDetail),
    #[error("request body exceeds the {limit} byte limit")]
    PayloadTooLarge { limit: usize },
    /// Aggregate of parameter, body and resolver problems in discovery order.
    #[error("validation failed with {} error(s)", .0.len())]
    ValidationFailed(Vec<ErrorDetail>),
    /// Error returned by handler or resolver logic.
    #[error(transparent)]
    HandlerFailure(#[from] StatusError),
    #[error("internal failure: {0}")]
    InternalFailure(String),
    /// The request was cancelled by the caller; nothing is written.
    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    /// HTTP status for this failure.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            ApiError::MalformedPayload(_) => 400,
            ApiError::PayloadTooLarge { .. } => 413,
            ApiError::ValidationFailed(_) => 422,
            ApiError::HandlerFailure(err) => err.status,
            ApiError::InternalFailure(_) => 500,
            ApiError::Cancelled => STATUS_CLIENT_CLOSED,
        }
    }

    /// Render the error body.
    #[must_use]
    pub fn to_model(&self) -> ErrorModel {
        let status = self.status();
        match self {
            ApiError::MalformedPayload(detail) => ErrorModel::new(
                status,
                Some(detail.message.clone()),
                vec![detail.clone()],
            ),
            ApiError::PayloadTooLarge { limit } => ErrorModel::new(
                status,
                Some("request body is too large".to_string()),
                vec![ErrorDetail::at(
                    "body",
                    format!("request body exceeds the {limit} byte limit"),
                )],
            ),
            ApiError::ValidationFailed(details) => ErrorModel::new(
                status,
                Some("validation failed".to_string()),
                details.clone(),
            ),
            ApiError::HandlerFailure(err) => {
                ErrorModel::new(status, Some(err.message.clone()), err.details.clone())
            }
            ApiError::InternalFailure(_) => ErrorModel::new(
                status,
                Some("internal server error".to_string()),
                Vec::new(),
            ),
            ApiError::Cancelled => ErrorModel::new(status, None, Vec::new()),
        }
    }
}

/// Failures while deriving schemas from type descriptions.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("schema name `{name}` is already used by `{existing}`, cannot register `{incoming}`")]
    SchemaNameConflict {
        name: String,
        existing: &'static str,
        incoming: &'static str,
    },
    #[error("invalid pattern `{pattern}` on `{field}`: {source}")]
    InvalidPattern {
        field: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid {what} `{value}` on `{field}`")]
    InvalidLiteral {
        field: String,
        what: &'static str,
        value: String,
    },
    #[error("field `{field}` of `{owner}` uses role {role:?} which is only valid on input types")]
    MisplacedRole {
        owner: &'static str,
        field: &'static str,
        role: FieldRole,
    },
    #[error("reference to unknown schema `{name}`")]
    UnresolvedReference { name: String },
    #[error("generated schema `{name}` is not a valid JSON Schema: {message}")]
    InvalidDocument { name: String, message: String },
}

/// Failures while registering an operation.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("duplicate route {method} {path}")]
    DuplicateRoute { method: String, path: String },
    #[error("duplicate operation id `{0}`")]
    DuplicateOperationId(String),
    #[error("invalid path pattern `{path}`: {message}")]
    InvalidPath { path: String, message: String },
    #[error("path `{path}` has no input field bound to parameter `{name}`")]
    UnboundPathParameter { path: String, name: String },
    #[error("parameter `{location}` has unsupported type `{type_name}`")]
    UnsupportedParameter {
        location: String,
        type_name: &'static str,
    },
    #[error("default `{value}` for `{location}` is invalid: {message}")]
    InvalidDefault {
        location: String,
        value: String,
        message: String,
    },
    #[error("response shape {shape} lists header `{header}` which the output type does not declare")]
    UndeclaredHeader { shape: usize, header: String },
    #[error("input field `{field}` has no binding source")]
    UnboundInputField { field: &'static str },
    #[error("input type `{type_name}` must be a struct or `()`")]
    UnsupportedInput { type_name: &'static str },
}

/// Decoding failures when turning bound values into the typed input.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct BindError {
    pub location: String,
    pub message: String,
}

impl BindError {
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn into_detail(self) -> ErrorDetail {
        ErrorDetail::at(self.location, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detail_serialization_skips_missing_fields() {
        let detail = ErrorDetail::new("body resolver error");
        assert_eq!(
            serde_json::to_value(&detail).unwrap(),
            json!({"message": "body resolver error"})
        );

        let detail = ErrorDetail::at("path.id", "expected length <= 5").with_value("123456");
        assert_eq!(
            serde_json::to_value(&detail).unwrap(),
            json!({"message": "expected length <= 5", "location": "path.id", "value": "123456"})
        );
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::MalformedPayload(ErrorDetail::new("x")).status(), 400);
        assert_eq!(ApiError::PayloadTooLarge { limit: 1 }.status(), 413);
        assert_eq!(ApiError::ValidationFailed(vec![]).status(), 422);
        assert_eq!(ApiError::from(StatusError::forbidden("nope")).status(), 403);
        assert_eq!(ApiError::InternalFailure("boom".into()).status(), 500);
        assert_eq!(ApiError::Cancelled.status(), STATUS_CLIENT_CLOSED);
    }

    #[test]
    fn test_model_field_order() {
        let mut model = ApiError::ValidationFailed(vec![ErrorDetail::at("body", "x")]).to_model();
        model.schema = Some("https://example.com/schemas/ErrorModel.json".into());
        let text = serde_json::to_string(&model).unwrap();
        let schema_at = text.find("$schema").unwrap();
        let title_at = text.find("\"title\"").unwrap();
        let errors_at = text.find("\"errors\"").unwrap();
        assert!(schema_at < title_at && title_at < errors_at);
        assert_eq!(model.title, "Unprocessable Entity");
        assert_eq!(model.detail.as_deref(), Some("validation failed"));
    }

    #[test]
    fn test_reason_phrase_fallbacks() {
        assert_eq!(reason_phrase(404), "Not Found");
        assert_eq!(reason_phrase(499), "Client Closed Request");
        assert_eq!(reason_phrase(299), "Success");
    }
}
