//! # Binder Module
//!
//! Turns a routed request into a [`BoundInput`]: parameters are extracted,
//! coerced and validated first, then the body is parsed and validated. Every
//! problem is collected; only cancellation, a missing required body or an
//! unparseable payload stop binding early.
//!
//! After the typed input has been decoded the [`Resolver`] walk runs custom
//! semantic checks over the value tree.

mod body;
mod params;
mod resolver;

pub use body::read_body;
pub(crate) use body::bind_body;
pub(crate) use params::{bind_params, coerce_scalar};
pub use params::RequestValues;
pub(crate) use resolver::run_resolvers;
pub use resolver::Resolver;

use crate::error::{ApiError, BindError, ErrorDetail};
use crate::operation::OperationMeta;
use crate::validator::Validator;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;

/// Request-scoped bound values, keyed by location (`path.id`, `query.limit`).
#[derive(Debug, Default)]
pub struct BoundInput {
    params: HashMap<String, Value>,
    body: Option<Value>,
    raw: Vec<u8>,
}

impl BoundInput {
    /// Decode the parameter bound at `location`; unknown locations decode from `null`.
    pub fn take_param<T: DeserializeOwned>(&mut self, location: &str) -> Result<T, BindError> {
        let value = self.params.remove(location).unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| BindError::new(location, e.to_string()))
    }

    /// Decode the structured body.
    pub fn take_body<T: DeserializeOwned>(&mut self) -> Result<T, BindError> {
        let value = self.body.take().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| BindError::new("body", e.to_string()))
    }

    /// The raw payload bytes.
    pub fn take_raw(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.raw)
    }

    /// Bound value at `location` without consuming it.
    #[must_use]
    pub fn param(&self, location: &str) -> Option<&Value> {
        self.params.get(location)
    }
}

/// Bind parameters then body for `meta`.
///
/// Returns the bound values together with every validation problem found.
///
/// # Errors
///
/// `Cancelled` when the signal fires between fields or phases, and
/// `MalformedPayload` for unparseable or missing required bodies.
pub fn bind_request(
    meta: &OperationMeta,
    values: &RequestValues<'_>,
    validator: &Validator<'_>,
) -> Result<(BoundInput, Vec<ErrorDetail>), ApiError> {
    let mut errors = Vec::new();
    let params = bind_params(&meta.params, values, validator, &mut errors)?;
    values.check_cancelled()?;

    let mut bound = BoundInput {
        params,
        body: None,
        raw: Vec::new(),
    };
    if let Some(body) = &meta.body {
        bound.body = bind_body(body, values.body, values.content_type, validator, &mut errors)?;
        if body.raw {
            bound.raw = values.body.to_vec();
        }
    }
    values.check_cancelled()?;
    Ok((bound, errors))
}
