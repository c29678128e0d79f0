use crate::error::{ApiError, ErrorDetail};
use crate::operation::ParamMeta;
use crate::router::ParamVec;
use crate::schema::{FieldRole, ScalarKind};
use crate::server::CancelSignal;
use crate::validator::{PathBuffer, Validator};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use http::HeaderMap;
use serde_json::{Number, Value};
use std::collections::HashMap;
use tracing::debug;

/// Raw request values visible to the binder.
#[derive(Debug, Clone, Copy)]
pub struct RequestValues<'a> {
    pub path: &'a ParamVec,
    pub query: &'a [(String, String)],
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
    pub content_type: Option<&'a str>,
    pub cancel: Option<&'a CancelSignal>,
}

impl RequestValues<'_> {
    pub(crate) fn check_cancelled(&self) -> Result<(), ApiError> {
        match self.cancel {
            Some(signal) if signal.is_cancelled() => Err(ApiError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Non-empty raw values for a parameter in arrival order.
    fn lookup(&self, param: &ParamMeta) -> Vec<&str> {
        match param.role {
            FieldRole::Path => self
                .path
                .iter()
                .rfind(|(k, _)| k.as_ref() == param.name)
                .map(|(_, v)| v.as_str())
                .into_iter()
                .filter(|v| !v.is_empty())
                .collect(),
            FieldRole::Query => self
                .query
                .iter()
                .filter(|(k, v)| k == param.name && !v.is_empty())
                .map(|(_, v)| v.as_str())
                .collect(),
            FieldRole::Header => self
                .headers
                .get_all(param.name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Bind every declared parameter, appending all problems to `errors`.
///
/// A field error never stops binding of the remaining fields; the field
/// resolves to its zero value instead.
pub(crate) fn bind_params(
    params: &[ParamMeta],
    values: &RequestValues<'_>,
    validator: &Validator<'_>,
    errors: &mut Vec<ErrorDetail>,
) -> Result<HashMap<String, Value>, ApiError> {
    let mut bound = HashMap::with_capacity(params.len());
    for param in params {
        values.check_cancelled()?;
        let value = bind_param(param, values, validator, errors);
        bound.insert(param.location.clone(), value);
    }
    Ok(bound)
}

fn bind_param(
    param: &ParamMeta,
    values: &RequestValues<'_>,
    validator: &Validator<'_>,
    errors: &mut Vec<ErrorDetail>,
) -> Value {
    let raw = values.lookup(param);
    if raw.is_empty() {
        if param.required {
            errors.push(ErrorDetail::at(
                param.location.as_str(),
                format!("required {} parameter is missing", param.role.source()),
            ));
            return param.zero.clone();
        }
        return match &param.default {
            Some(default) => default.clone(),
            None if param.optional => Value::Null,
            None => param.zero.clone(),
        };
    }

    let header = param.role == FieldRole::Header;
    let parsed = if param.list {
        let mut items = Vec::new();
        let mut failed = false;
        for piece in raw.iter().flat_map(|r| r.split(',')) {
            match coerce_scalar(param.kind, piece, param.time_format, header) {
                Ok(item) => items.push(item),
                Err(message) => {
                    errors.push(ErrorDetail::at(param.location.as_str(), message).with_value(piece));
                    failed = true;
                }
            }
        }
        if failed {
            return param.zero.clone();
        }
        Value::Array(items)
    } else {
        // Repeated scalars: last one wins.
        let last = raw[raw.len() - 1];
        match coerce_scalar(param.kind, last, param.time_format, header) {
            Ok(value) => value,
            Err(message) => {
                errors.push(ErrorDetail::at(param.location.as_str(), message).with_value(last));
                return param.zero.clone();
            }
        }
    };

    if let Some(schema) = &param.schema {
        let mut path = PathBuffer::from_root(&param.location);
        validator.validate(schema, &parsed, &mut path, errors);
    }
    debug!(location = %param.location, value = %parsed, "Parameter bound");
    parsed
}

/// Parse one raw parameter value as `kind`.
///
/// Date/times resolve to RFC 3339 in UTC; `time_format` is a `chrono` format
/// string and date-only formats resolve to midnight. Header values also
/// accept HTTP-dates.
pub(crate) fn coerce_scalar(
    kind: ScalarKind,
    raw: &str,
    time_format: Option<&str>,
    header: bool,
) -> Result<Value, &'static str> {
    match kind {
        ScalarKind::Bool => match raw {
            "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(Value::Bool(true)),
            "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(Value::Bool(false)),
            _ => Err("invalid bool"),
        },
        ScalarKind::Integer { .. } => {
            let parsed: i128 = raw.parse().map_err(|_| "invalid integer")?;
            let (min, max) = kind.integer_bounds().unwrap_or((i128::MIN, i128::MAX));
            if parsed < min || parsed > max {
                return Err("invalid integer");
            }
            if let Ok(v) = i64::try_from(parsed) {
                Ok(Value::from(v))
            } else {
                u64::try_from(parsed)
                    .map(Value::from)
                    .map_err(|_| "invalid integer")
            }
        }
        ScalarKind::Float { bits } => {
            let parsed: f64 = raw.parse().map_err(|_| "invalid float")?;
            if !parsed.is_finite() || (bits == 32 && !(parsed as f32).is_finite()) {
                return Err("invalid float");
            }
            Number::from_f64(parsed)
                .map(Value::Number)
                .ok_or("invalid float")
        }
        ScalarKind::String => Ok(Value::String(raw.to_string())),
        ScalarKind::DateTime => parse_datetime(raw, time_format, header)
            .map(|dt| Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)))
            .ok_or("invalid date/time"),
        ScalarKind::Date => {
            let date = match time_format {
                Some(fmt) => NaiveDate::parse_from_str(raw, fmt).ok(),
                None => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
            };
            date.map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .ok_or("invalid date/time")
        }
    }
}

fn parse_datetime(raw: &str, time_format: Option<&str>, header: bool) -> Option<DateTime<Utc>> {
    if let Some(fmt) = time_format {
        if let Ok(dt) = DateTime::parse_from_str(raw, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.and_utc());
        }
        return NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());
    }
    if header {
        if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const I8: ScalarKind = ScalarKind::Integer {
        signed: true,
        bits: 8,
    };
    const U64: ScalarKind = ScalarKind::Integer {
        signed: false,
        bits: 64,
    };

    #[test]
    fn test_bool_forms() {
        for raw in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(coerce_scalar(ScalarKind::Bool, raw, None, false), Ok(json!(true)));
        }
        for raw in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(coerce_scalar(ScalarKind::Bool, raw, None, false), Ok(json!(false)));
        }
        assert_eq!(
            coerce_scalar(ScalarKind::Bool, "yes", None, false),
            Err("invalid bool")
        );
    }

    #[test]
    fn test_integer_width_checks() {
        assert_eq!(coerce_scalar(I8, "-128", None, false), Ok(json!(-128)));
        assert_eq!(coerce_scalar(I8, "128", None, false), Err("invalid integer"));
        assert_eq!(
            coerce_scalar(U64, "18446744073709551615", None, false),
            Ok(json!(u64::MAX))
        );
        assert_eq!(coerce_scalar(U64, "-1", None, false), Err("invalid integer"));
        assert_eq!(coerce_scalar(U64, "1.5", None, false), Err("invalid integer"));
    }

    #[test]
    fn test_float_parsing() {
        let f32k = ScalarKind::Float { bits: 32 };
        assert_eq!(coerce_scalar(f32k, "1.5", None, false), Ok(json!(1.5)));
        assert_eq!(coerce_scalar(f32k, "1e39", None, false), Err("invalid float"));
        assert_eq!(
            coerce_scalar(ScalarKind::Float { bits: 64 }, "NaN", None, false),
            Err("invalid float")
        );
    }

    #[test]
    fn test_datetime_forms() {
        assert_eq!(
            coerce_scalar(ScalarKind::DateTime, "2024-05-01T10:00:00+02:00", None, false),
            Ok(json!("2024-05-01T08:00:00Z"))
        );
        assert_eq!(
            coerce_scalar(ScalarKind::DateTime, "Sun, 06 Nov 1994 08:49:37 GMT", None, true),
            Ok(json!("1994-11-06T08:49:37Z"))
        );
        assert_eq!(
            coerce_scalar(ScalarKind::DateTime, "Sun, 06 Nov 1994 08:49:37 GMT", None, false),
            Err("invalid date/time")
        );
        assert_eq!(
            coerce_scalar(ScalarKind::DateTime, "2024-05-01", Some("%Y-%m-%d"), false),
            Ok(json!("2024-05-01T00:00:00Z"))
        );
        assert_eq!(
            coerce_scalar(ScalarKind::Date, "2024-02-30", None, false),
            Err("invalid date/time")
        );
    }
}
