use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method};
use serde_json::Value;
use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Cancellation flag shared between the transport and the request pipeline.
#[derive(Debug, Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Transport-neutral request handed to [`Api::handle`](super::Api::handle).
///
/// The body is a reader so the transport does not need to buffer it; it is
/// read at most once, and only for operations that bind a body.
pub struct RequestParts {
    pub method: Method,
    /// Path with optional query string, e.g. `/users/42?verbose=true`.
    pub target: String,
    pub headers: HeaderMap,
    body: Box<dyn Read + Send>,
    pub cancel: Option<CancelSignal>,
}

impl RequestParts {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: Box::new(io::empty()),
            cancel: None,
        }
    }

    /// Append a header; invalid names or values are skipped.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(header = name, "Invalid request header, skipping"),
        }
        self
    }

    /// Use `bytes` as the body and set `content-length`.
    #[must_use]
    pub fn body(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        self.headers.insert(CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        self.body = Box::new(Cursor::new(bytes));
        self
    }

    /// Serialize `value` as the JSON body.
    #[must_use]
    pub fn json(mut self, value: &Value) -> Self {
        if !self.headers.contains_key(CONTENT_TYPE) {
            self.headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        self.body(value.to_string())
    }

    /// Stream the body from `reader` without a declared length.
    #[must_use]
    pub fn body_reader(mut self, reader: impl Read + Send + 'static) -> Self {
        self.body = Box::new(reader);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// Path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        self.target
            .split_once('?')
            .map_or(self.target.as_str(), |(path, _)| path)
    }

    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, query)| query)
    }

    /// Header value by case-insensitive name.
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Declared `content-length`, when present and numeric.
    #[must_use]
    pub fn content_length(&self) -> Option<usize> {
        self.get_header("content-length")
            .and_then(|v| v.trim().parse().ok())
    }

    pub(crate) fn take_body(&mut self) -> Box<dyn Read + Send> {
        std::mem::replace(&mut self.body, Box::new(io::empty()))
    }
}

impl fmt::Debug for RequestParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestParts")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("headers", &self.headers)
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

/// Decode a query string into pairs, keeping repeated names in order.
#[must_use]
pub fn parse_query_params(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_query_params() {
        let params = parse_query_params("tags=a&tags=b&name=J%C3%BCrgen+M");
        assert_eq!(
            params,
            vec![
                ("tags".to_string(), "a".to_string()),
                ("tags".to_string(), "b".to_string()),
                ("name".to_string(), "Jürgen M".to_string()),
            ]
        );
        assert!(parse_query_params("").is_empty());
    }

    #[test]
    fn test_target_split() {
        let req = RequestParts::new(Method::GET, "/items/1?limit=5");
        assert_eq!(req.path(), "/items/1");
        assert_eq!(req.query_string(), Some("limit=5"));
        let req = RequestParts::new(Method::GET, "/items");
        assert_eq!(req.path(), "/items");
        assert_eq!(req.query_string(), None);
    }

    #[test]
    fn test_json_body_sets_headers() {
        let mut req = RequestParts::new(Method::POST, "/items").json(&json!({"a": 1}));
        assert_eq!(req.get_header("Content-Type"), Some("application/json"));
        assert_eq!(req.content_length(), Some(7));
        let mut body = String::new();
        req.take_body().read_to_string(&mut body).unwrap();
        assert_eq!(body, r#"{"a":1}"#);
    }

    #[test]
    fn test_invalid_header_skipped() {
        let req = RequestParts::new(Method::GET, "/").header("bad header", "x");
        assert!(req.headers.is_empty());
    }

    #[test]
    fn test_cancel_signal_shared() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_cancelled());
        signal.cancel();
        assert!(clone.is_cancelled());
    }
}
