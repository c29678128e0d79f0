use crate::error::{ApiError, ErrorDetail};
use crate::operation::BodyMeta;
use crate::schema::SCHEMA_PROPERTY;
use crate::validator::{PathBuffer, Validator};
use serde_json::Value;
use std::io::Read;
use tracing::{debug, warn};

/// Read at most `limit` bytes from `reader`.
///
/// A declared `content_length` above the limit fails before anything is read;
/// otherwise one byte past the limit is requested to detect oversized streams.
pub fn read_body<R: Read>(
    reader: R,
    limit: usize,
    content_length: Option<usize>,
) -> Result<Vec<u8>, ApiError> {
    if content_length.is_some_and(|len| len > limit) {
        return Err(ApiError::PayloadTooLarge { limit });
    }
    let mut payload = Vec::with_capacity(content_length.unwrap_or(0).min(limit));
    reader
        .take((limit as u64).saturating_add(1))
        .read_to_end(&mut payload)
        .map_err(|err| {
            warn!(error = %err, "Failed to read request body");
            ApiError::MalformedPayload(ErrorDetail::at(
                "body",
                format!("unable to read body: {err}"),
            ))
        })?;
    if payload.len() > limit {
        return Err(ApiError::PayloadTooLarge { limit });
    }
    Ok(payload)
}

/// Parse and validate the payload according to the body plan.
///
/// Returns the document to decode into the structured body field, or `None`
/// when the input has no structured body. Schema violations are appended to
/// `errors`; syntax errors and a missing required body are returned.
pub(crate) fn bind_body(
    meta: &BodyMeta,
    payload: &[u8],
    content_type: Option<&str>,
    validator: &Validator<'_>,
    errors: &mut Vec<ErrorDetail>,
) -> Result<Option<Value>, ApiError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        if meta.required {
            return Err(ApiError::MalformedPayload(ErrorDetail::at(
                "body",
                "request body is required",
            )));
        }
        return Ok(meta.decode.then_some(Value::Null));
    }
    if !meta.decode && meta.schema.is_none() {
        return Ok(None);
    }

    let mut document = parse_document(payload, content_type)?;
    if let Some(schema) = &meta.schema {
        let before = errors.len();
        let mut path = PathBuffer::from_root("body");
        validator.validate(schema, &document, &mut path, errors);
        debug!(
            violations = errors.len() - before,
            bytes = payload.len(),
            "Body validated"
        );
    }
    if let Value::Object(map) = &mut document {
        map.remove(SCHEMA_PROPERTY);
    }
    Ok(meta.decode.then_some(document))
}

fn parse_document(payload: &[u8], content_type: Option<&str>) -> Result<Value, ApiError> {
    let yaml = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("yaml"));
    let parsed = if yaml {
        serde_yaml::from_slice::<Value>(payload).map_err(|e| e.to_string())
    } else {
        serde_json::from_slice::<Value>(payload).map_err(|e| e.to_string())
    };
    parsed.map_err(|message| {
        ApiError::MalformedPayload(ErrorDetail::at(
            "body",
            format!("unable to parse body: {message}"),
        ))
    })
}
