//! Response dispatch: shape selection, encoding and late failures.

use crate::config::BindConfig;
use crate::error::{ApiError, STATUS_CLIENT_CLOSED};
use crate::operation::{OperationMeta, ResponseShape, ShapeKind};
use crate::schema::SCHEMA_PROPERTY;
use crate::server::WireResponse;
use crate::typed::OutputParts;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Maximum inline response headers before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Response header storage.
pub type HeaderVec = SmallVec<[(Arc<str>, String); MAX_INLINE_HEADERS]>;

type Marshal = Box<dyn FnOnce() -> Result<Value, serde_json::Error> + Send>;

/// Body carried by the selected response shape.
pub enum Payload {
    Empty,
    /// Bytes written verbatim.
    Raw(Vec<u8>),
    /// Serialized lazily, after the status has been committed.
    Structured(Marshal),
}

impl Payload {
    pub fn structured<T: Serialize + Send + 'static>(value: T) -> Self {
        Payload::Structured(Box::new(move || serde_json::to_value(&value)))
    }

    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Payload::Raw(bytes.into())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Raw(bytes) => f.debug_tuple("Raw").field(&bytes.len()).finish(),
            Payload::Structured(_) => f.write_str("Structured(..)"),
        }
    }
}

/// Wire encoding of structured bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    #[default]
    Json,
    Yaml,
}

impl Format {
    /// Parse a configuration value; anything but `yaml`/`yml` is JSON.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Format::Yaml,
            _ => Format::Json,
        }
    }

    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Json => "application/json",
            Format::Yaml => "application/yaml",
        }
    }

    #[must_use]
    pub fn problem_content_type(self) -> &'static str {
        match self {
            Format::Json => "application/problem+json",
            Format::Yaml => "application/problem+yaml",
        }
    }

    /// Pick the preferred encoding from an `Accept` header.
    ///
    /// The highest `q` wins, earlier entries win ties, and wildcards or
    /// unknown media types fall back to `default`.
    #[must_use]
    pub fn negotiate(accept: Option<&str>, default: Format) -> Format {
        let Some(accept) = accept else {
            return default;
        };
        let mut best: Option<(f32, Format)> = None;
        for entry in accept.split(',') {
            let mut parts = entry.split(';');
            let media = parts
                .next()
                .map(|m| m.trim().to_ascii_lowercase())
                .unwrap_or_default();
            let q = parts
                .find_map(|p| p.trim().strip_prefix("q=").map(str::to_string))
                .and_then(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0);
            let format = match media.as_str() {
                "application/json" | "text/json" => Format::Json,
                "application/yaml" | "application/x-yaml" | "text/yaml" | "text/x-yaml" => {
                    Format::Yaml
                }
                m if m.ends_with("+json") => Format::Json,
                m if m.ends_with("+yaml") => Format::Yaml,
                _ => continue,
            };
            if q > 0.0 && best.map_or(true, |(top, _)| q > top) {
                best = Some((q, format));
            }
        }
        best.map_or(default, |(_, format)| format)
    }

    fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>, String> {
        match self {
            Format::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
            Format::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
        }
    }
}

/// What a transformer knows about the response it rewrites.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub operation_id: &'a str,
    /// The committed status.
    pub status: u16,
    pub schema_name: Option<&'a str>,
    pub schema_url: Option<&'a str>,
}

/// Rewrites structured bodies after the status has been committed.
pub type Transformer =
    Box<dyn Fn(&TransformContext<'_>, Value) -> anyhow::Result<Value> + Send + Sync>;

/// Accumulates a response; the first committed status is final.
#[derive(Debug, Default)]
pub struct ResponseWriter {
    status: Option<u16>,
    headers: HeaderVec,
    body: Vec<u8>,
}

impl ResponseWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a header, replacing any value with the same name.
    pub fn header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((Arc::from(name), value)),
        }
    }

    /// Commit `status` unless a status was committed already; returns the committed status.
    pub fn commit(&mut self, status: u16) -> u16 {
        *self.status.get_or_insert(status)
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn write(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Replace the body with a plain-text diagnostic, keeping the committed status.
    fn fail_late(&mut self, message: &str) {
        self.header("content-type", "text/plain; charset=utf-8");
        self.body.clear();
        self.body.extend_from_slice(message.as_bytes());
    }

    #[must_use]
    pub fn finish(self) -> WireResponse {
        WireResponse {
            status: self.status.unwrap_or(500),
            headers: self.headers,
            body: self.body,
        }
    }
}

/// Writes handler outputs and errors for one request.
#[derive(Clone, Copy)]
pub struct Dispatcher<'a> {
    config: &'a BindConfig,
    transformers: &'a [Transformer],
    accept: Option<&'a str>,
    host: Option<&'a str>,
}

impl<'a> Dispatcher<'a> {
    #[must_use]
    pub fn new(config: &'a BindConfig, transformers: &'a [Transformer]) -> Self {
        Self {
            config,
            transformers,
            accept: None,
            host: None,
        }
    }

    /// `Accept` header of the request.
    #[must_use]
    pub fn accept(mut self, accept: Option<&'a str>) -> Self {
        self.accept = accept;
        self
    }

    /// `Host` header of the request, used for schema links.
    #[must_use]
    pub fn host(mut self, host: Option<&'a str>) -> Self {
        self.host = host;
        self
    }

    /// URI of the schema document for `name`.
    #[must_use]
    pub fn schema_url(&self, name: &str) -> String {
        let base = match (&self.config.schema_base_url, self.host) {
            (Some(base), _) => base.trim_end_matches('/').to_string(),
            (None, Some(host)) => format!("https://{host}"),
            (None, None) => String::new(),
        };
        format!(
            "{base}{}/{name}.json",
            self.config.schemas_path.trim_end_matches('/')
        )
    }

    #[must_use]
    pub fn format(&self) -> Format {
        Format::negotiate(self.accept, self.config.default_format)
    }

    /// Write the handler output for `meta`.
    #[must_use]
    pub fn output(&self, meta: &OperationMeta, parts: OutputParts) -> WireResponse {
        let OutputParts {
            status: dynamic,
            headers,
            selected,
        } = parts;
        let (shape, payload) = match selected {
            Some((index, payload)) => match meta.shapes.get(index) {
                Some(shape) => (Some(shape), payload),
                None => {
                    error!(
                        operation_id = %meta.operation_id,
                        index,
                        "Output selected an undeclared response shape"
                    );
                    return self.error(&ApiError::InternalFailure(format!(
                        "undeclared response shape {index}"
                    )));
                }
            },
            None => (None, Payload::Empty),
        };

        let mut writer = ResponseWriter::new();
        for (name, value) in headers {
            let Some(value) = value else {
                continue;
            };
            if shape.map_or(true, |s| s.allows_header(name)) {
                writer.header(name, value);
            } else {
                warn!(
                    operation_id = %meta.operation_id,
                    header = name,
                    "Header not declared for the selected response, dropping"
                );
            }
        }

        let status = writer.commit(
            dynamic
                .filter(|_| meta.dynamic_status)
                .unwrap_or_else(|| shape.map_or(meta.default_status, |s| s.status)),
        );

        match payload {
            Payload::Empty => {}
            Payload::Raw(bytes) => {
                let content_type = shape
                    .and_then(|s| s.content_type)
                    .unwrap_or("application/octet-stream");
                writer.header("content-type", content_type);
                writer.write(&bytes);
            }
            Payload::Structured(marshal) => {
                self.write_structured(&mut writer, meta, shape, status, marshal);
            }
        }
        writer.finish()
    }

    fn write_structured(
        &self,
        writer: &mut ResponseWriter,
        meta: &OperationMeta,
        shape: Option<&ResponseShape>,
        status: u16,
        marshal: Marshal,
    ) {
        let schema_name = shape.and_then(|s| match &s.body {
            ShapeKind::Structured { schema_name, .. } => schema_name.as_deref(),
            _ => None,
        });
        let mut value = match marshal() {
            Ok(value) => value,
            Err(err) => {
                warn!(operation_id = %meta.operation_id, status, error = %err, "Response marshaling failed");
                writer.fail_late("error marshaling response");
                return;
            }
        };

        let schema_url = schema_name.map(|name| self.schema_url(name));
        if let (Value::Object(map), Some(url)) = (&mut value, &schema_url) {
            if !map.contains_key(SCHEMA_PROPERTY) {
                let mut linked = Map::with_capacity(map.len() + 1);
                linked.insert(SCHEMA_PROPERTY.to_string(), Value::String(url.clone()));
                linked.extend(std::mem::take(map));
                *map = linked;
            }
        }

        let cx = TransformContext {
            operation_id: &meta.operation_id,
            status,
            schema_name,
            schema_url: schema_url.as_deref(),
        };
        for transform in self.transformers {
            value = match transform(&cx, value) {
                Ok(value) => value,
                Err(err) => {
                    warn!(operation_id = %meta.operation_id, status, error = %err, "Response transformer failed");
                    writer.fail_late("error transforming response");
                    return;
                }
            };
        }

        let format = self.format();
        match format.encode(&value) {
            Ok(bytes) => {
                let declared = shape
                    .and_then(|s| s.content_type)
                    .filter(|ct| format == Format::Json && ct.contains("json"));
                writer.header("content-type", declared.unwrap_or(format.content_type()));
                writer.write(&bytes);
            }
            Err(err) => {
                warn!(operation_id = %meta.operation_id, status, error = %err, "Response encoding failed");
                writer.fail_late("error marshaling response");
            }
        }
    }

    /// Write an error response; cancellation writes only its status.
    #[must_use]
    pub fn error(&self, err: &ApiError) -> WireResponse {
        let mut writer = ResponseWriter::new();
        if matches!(err, ApiError::Cancelled) {
            debug!("Request cancelled, nothing written");
            writer.commit(STATUS_CLIENT_CLOSED);
            return writer.finish();
        }

        let status = writer.commit(err.status());
        match err {
            ApiError::InternalFailure(cause) => {
                error!(status, cause = %cause, "Request failed with internal error");
            }
            _ if status >= 500 => error!(status, error = %err, "Request failed"),
            _ => debug!(status, error = %err, "Request rejected"),
        }

        let mut model = err.to_model();
        model.schema = Some(self.schema_url("ErrorModel"));
        let format = self.format();
        match format.encode(&model) {
            Ok(bytes) => {
                writer.header("content-type", format.problem_content_type());
                writer.write(&bytes);
            }
            Err(encode_err) => {
                warn!(status, error = %encode_err, "Error response encoding failed");
                writer.fail_late("error marshaling response");
            }
        }
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation() {
        assert_eq!(Format::negotiate(None, Format::Json), Format::Json);
        assert_eq!(
            Format::negotiate(Some("application/yaml"), Format::Json),
            Format::Yaml
        );
        assert_eq!(
            Format::negotiate(Some("application/json;q=0.5, text/yaml"), Format::Json),
            Format::Yaml
        );
        assert_eq!(
            Format::negotiate(Some("application/vnd.api+json"), Format::Yaml),
            Format::Json
        );
        assert_eq!(Format::negotiate(Some("*/*"), Format::Yaml), Format::Yaml);
        assert_eq!(
            Format::negotiate(Some("application/yaml;q=0"), Format::Json),
            Format::Json
        );
    }

    #[test]
    fn test_writer_commits_once() {
        let mut writer = ResponseWriter::new();
        assert_eq!(writer.commit(201), 201);
        assert_eq!(writer.commit(500), 201);
        writer.header("Content-Type", "application/json");
        writer.header("content-type", "text/plain");
        writer.write(b"ok");
        let response = writer.finish();
        assert_eq!(response.status, 201);
        assert_eq!(response.headers.len(), 1);
        assert_eq!(response.get_header("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn test_schema_url() {
        let config = BindConfig::default();
        let dispatcher = Dispatcher::new(&config, &[]).host(Some("api.example.com"));
        assert_eq!(
            dispatcher.schema_url("Item"),
            "https://api.example.com/schemas/Item.json"
        );

        let config = BindConfig {
            schema_base_url: Some("http://localhost:8080/".into()),
            ..BindConfig::default()
        };
        let dispatcher = Dispatcher::new(&config, &[]).host(Some("ignored"));
        assert_eq!(
            dispatcher.schema_url("Item"),
            "http://localhost:8080/schemas/Item.json"
        );
    }

    #[test]
    fn test_cancelled_writes_status_only() {
        let config = BindConfig::default();
        let response = Dispatcher::new(&config, &[]).error(&ApiError::Cancelled);
        assert_eq!(response.status, STATUS_CLIENT_CLOSED);
        assert!(response.body.is_empty());
    }
}
