//! Router core: path patterns compiled to regexes, matched per request.

#![deny(clippy::inefficient_to_string)]
#![deny(clippy::format_push_string)]
#![deny(clippy::unnecessary_to_owned)]

use crate::error::RegistrationError;
use crate::operation::OperationMeta;
use http::Method;
use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum number of path parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Path parameter storage; names come from the compiled route and are shared.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Placeholder names: letters, digits, `_`, `-` and `.`, not starting with a digit.
static PARAM_NAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("parameter name regex should be valid")
});

/// Result of matching a request path to a registered operation.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub operation: Arc<OperationMeta>,
    /// Percent-decoded path parameter values in pattern order.
    pub path_params: ParamVec,
}

impl RouteMatch {
    /// Get a path parameter by name; the last occurrence wins.
    #[inline]
    #[must_use]
    pub fn get_path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone)]
struct CompiledRoute {
    method: Method,
    regex: Regex,
    operation: Arc<OperationMeta>,
    param_names: Vec<Arc<str>>,
}

/// Method + path pattern table built as operations are registered.
#[derive(Clone, Default)]
pub struct Router {
    routes: Vec<CompiledRoute>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route for `operation`.
    ///
    /// # Errors
    ///
    /// `InvalidPath` for malformed patterns and `DuplicateRoute` when the
    /// method already has a pattern of the same shape (`/a/{x}` vs `/a/{y}`).
    pub fn insert(&mut self, operation: Arc<OperationMeta>) -> Result<(), RegistrationError> {
        let (regex, param_names) = Self::path_to_regex(&operation.path_pattern)?;
        let shape = placeholder_shape(&operation.path_pattern);
        let clash = self.routes.iter().any(|r| {
            r.method == operation.method && placeholder_shape(&r.operation.path_pattern) == shape
        });
        if clash {
            return Err(RegistrationError::DuplicateRoute {
                method: operation.method.to_string(),
                path: operation.path_pattern.clone(),
            });
        }

        info!(
            method = %operation.method,
            path = %operation.path_pattern,
            operation_id = %operation.operation_id,
            params = param_names.len(),
            "Route registered"
        );
        self.routes.push(CompiledRoute {
            method: operation.method.clone(),
            regex,
            operation,
            param_names,
        });
        Ok(())
    }

    /// Match a request against the table, first registered route first.
    #[must_use]
    pub fn route(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let match_start = std::time::Instant::now();
        for route in self.routes.iter().filter(|r| r.method == *method) {
            let Some(captures) = route.regex.captures(path) else {
                continue;
            };
            let mut path_params = ParamVec::new();
            for (i, name) in route.param_names.iter().enumerate() {
                let raw = captures.get(i + 1).map_or("", |m| m.as_str());
                let value = match urlencoding::decode(raw) {
                    Ok(decoded) => decoded.into_owned(),
                    Err(_) => raw.to_string(),
                };
                path_params.push((Arc::clone(name), value));
            }
            debug!(
                method = %method,
                path = %path,
                operation_id = %route.operation.operation_id,
                route_pattern = %route.operation.path_pattern,
                path_params = ?path_params,
                duration_us = match_start.elapsed().as_micros(),
                "Route matched"
            );
            return Some(RouteMatch {
                operation: Arc::clone(&route.operation),
                path_params,
            });
        }

        warn!(
            method = %method,
            path = %path,
            duration_us = match_start.elapsed().as_micros(),
            "No route matched"
        );
        None
    }

    /// Registered `(method, pattern)` pairs in registration order.
    #[must_use]
    pub fn patterns(&self) -> Vec<(Method, String)> {
        self.routes
            .iter()
            .map(|r| (r.method.clone(), r.operation.path_pattern.clone()))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Compile a path pattern such as `/users/{id}/posts/{post_id}`.
    pub(crate) fn path_to_regex(path: &str) -> Result<(Regex, Vec<Arc<str>>), RegistrationError> {
        let names = path_param_names(path)?;
        let pattern = to_regex_pattern(path)?;
        let regex = Regex::new(&pattern).map_err(|e| RegistrationError::InvalidPath {
            path: path.to_string(),
            message: e.to_string(),
        })?;
        Ok((regex, names.into_iter().map(Arc::from).collect()))
    }
}

/// Anchored regex source for `path`.
///
/// Literal text is escaped; each `{name}` becomes a capture group matching
/// one non-empty segment, in placeholder order.
///
/// # Errors
///
/// `InvalidPath` for malformed patterns, see [`path_param_names`].
pub fn to_regex_pattern(path: &str) -> Result<String, RegistrationError> {
    path_param_names(path)?;
    let mut pattern = String::with_capacity(path.len() + 16);
    pattern.push('^');
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        pattern.push_str(&regex::escape(&rest[..open]));
        let close = rest[open..].find('}').map_or(rest.len(), |c| open + c);
        pattern.push_str("([^/]+)");
        rest = rest.get(close + 1..).unwrap_or("");
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    Ok(pattern)
}

/// Placeholder names of `path` in order.
///
/// # Errors
///
/// `InvalidPath` when the pattern does not start with `/`, has an unclosed or
/// nested brace, or an empty or malformed placeholder name.
pub fn path_param_names(path: &str) -> Result<Vec<&str>, RegistrationError> {
    let invalid = |message: &str| RegistrationError::InvalidPath {
        path: path.to_string(),
        message: message.to_string(),
    };
    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }

    let mut names = Vec::new();
    let mut rest = path;
    while let Some(open) = rest.find(['{', '}']) {
        if rest.as_bytes()[open] == b'}' {
            return Err(invalid("unexpected '}'"));
        }
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| invalid("unclosed '{'"))?;
        let name = &after[..close];
        if name.is_empty() {
            return Err(invalid("empty parameter name"));
        }
        if !PARAM_NAME_REGEX.is_match(name) {
            return Err(invalid("malformed parameter name"));
        }
        names.push(name);
        rest = &after[close + 1..];
    }
    Ok(names)
}

/// Rewrite `{name}` placeholders as `:name` for routers using colon syntax.
#[must_use]
pub fn to_colon_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close) => {
                out.push(':');
                out.push_str(&rest[open + 1..open + close]);
                rest = &rest[open + close + 1..];
            }
            None => {
                rest = &rest[open..];
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Pattern with placeholder names erased, used to detect clashing routes.
fn placeholder_shape(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut in_param = false;
    for c in path.chars() {
        match c {
            '{' => {
                in_param = true;
                out.push_str("{}");
            }
            '}' => in_param = false,
            _ if in_param => {}
            _ => out.push(c),
        }
    }
    out
}

/// Host router integration: receives every registered operation.
///
/// Paths are handed over in the host's native syntax, colon style unless
/// [`native_path`](RouteAdapter::native_path) is overridden.
///
/// ```rust,ignore
/// struct Table(Vec<String>);
///
/// impl RouteAdapter for Table {
///     fn add_route(&mut self, method: &Method, path: &str, operation_id: &str) {
///         self.0.push(format!("{method} {path} {operation_id}"));
///     }
/// }
///
/// api.mount(&mut table);
/// ```
pub trait RouteAdapter {
    fn add_route(&mut self, method: &Method, path: &str, operation_id: &str);

    /// Convert a `{name}` pattern to the host syntax.
    fn native_path(&self, path: &str) -> Result<String, RegistrationError> {
        Ok(to_colon_path(path))
    }
}
