use super::request::{parse_query_params, RequestParts};
use super::response::WireResponse;
use crate::binder::{bind_request, read_body, RequestValues};
use crate::config::BindConfig;
use crate::dispatcher::{Dispatcher, Transformer};
use crate::error::{ApiError, ErrorModel, RegistrationError, SchemaError, StatusError};
use crate::ids::RequestId;
use crate::operation::{build_operation, Operation, OperationMeta};
use crate::router::{RouteAdapter, Router};
use crate::schema::{SchemaRegistry, TypeRef};
use crate::typed::{erase, Context, ErasedHandler, Input, Output};
use crate::validator::Validator;
use http::Method;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// Registered operations with their schemas, routes and handlers.
///
/// Built with `&mut self` at startup, then shared read-only by every request
/// through [`Api::handle`].
pub struct Api {
    config: BindConfig,
    registry: SchemaRegistry,
    router: Router,
    handlers: HashMap<String, ErasedHandler>,
    transformers: Vec<Transformer>,
    operations: Vec<Arc<OperationMeta>>,
}

impl Api {
    #[must_use]
    pub fn new(config: BindConfig) -> Self {
        let mut registry = SchemaRegistry::new();
        if let Err(err) = registry.schema_for(TypeRef::of::<ErrorModel>(), true, "ErrorModel") {
            error!(error = %err, "Failed to register the error model schema");
        }
        Self {
            config,
            registry,
            router: Router::new(),
            handlers: HashMap::new(),
            transformers: Vec::new(),
            operations: Vec::new(),
        }
    }

    /// Register an operation and its handler.
    ///
    /// Derives the parameter plan and every schema the input and output types
    /// need, checks each exported schema document compiles, and adds the route.
    ///
    /// # Errors
    ///
    /// Any [`RegistrationError`]; the operation is not added when one is returned.
    pub fn register<I, O, F>(
        &mut self,
        op: Operation,
        handler: F,
    ) -> Result<Arc<OperationMeta>, RegistrationError>
    where
        I: Input,
        O: Output,
        F: Fn(&Context<'_>, I) -> Result<O, ApiError> + Send + Sync + 'static,
    {
        let meta = build_operation::<I, O>(op, &mut self.registry, &self.config)?;
        if self.handlers.contains_key(&meta.operation_id) {
            return Err(RegistrationError::DuplicateOperationId(meta.operation_id));
        }
        for schema in meta.schemas() {
            self.registry.check_references(schema)?;
        }
        for name in meta.schema_names() {
            self.check_document(name)?;
        }

        let meta = Arc::new(meta);
        self.router.insert(Arc::clone(&meta))?;
        self.handlers
            .insert(meta.operation_id.clone(), erase::<I, O, F>(handler));
        self.operations.push(Arc::clone(&meta));
        info!(
            operation_id = %meta.operation_id,
            method = %meta.method,
            path = %meta.path_pattern,
            params = meta.params.len(),
            has_body = meta.body.is_some(),
            shapes = meta.shapes.len(),
            "Operation registered"
        );
        Ok(meta)
    }

    fn check_document(&self, name: &str) -> Result<(), SchemaError> {
        let Some(doc) = self.registry.document(name, None) else {
            return Ok(());
        };
        jsonschema::options()
            .with_draft(jsonschema::Draft::Draft202012)
            .build(&doc)
            .map(|_| ())
            .map_err(|err| SchemaError::InvalidDocument {
                name: name.to_string(),
                message: err.to_string(),
            })
    }

    /// Add a transformer run on every structured response body, in insertion order.
    pub fn add_transformer<F>(&mut self, transform: F)
    where
        F: Fn(&crate::dispatcher::TransformContext<'_>, Value) -> anyhow::Result<Value>
            + Send
            + Sync
            + 'static,
    {
        self.transformers.push(Box::new(transform));
    }

    #[must_use]
    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Registered operations in registration order.
    #[must_use]
    pub fn operations(&self) -> &[Arc<OperationMeta>] {
        &self.operations
    }

    /// Operations grouped by path pattern, then method.
    #[must_use]
    pub fn paths(&self) -> BTreeMap<String, BTreeMap<String, Arc<OperationMeta>>> {
        let mut paths: BTreeMap<String, BTreeMap<String, Arc<OperationMeta>>> = BTreeMap::new();
        for op in &self.operations {
            paths
                .entry(op.path_pattern.clone())
                .or_default()
                .insert(op.method.to_string(), Arc::clone(op));
        }
        paths
    }

    /// Hand every operation to a host router.
    ///
    /// # Errors
    ///
    /// Whatever the adapter's path conversion returns.
    pub fn mount(&self, adapter: &mut dyn RouteAdapter) -> Result<(), RegistrationError> {
        for op in &self.operations {
            let path = adapter.native_path(&op.path_pattern)?;
            adapter.add_route(&op.method, &path, &op.operation_id);
            debug!(operation_id = %op.operation_id, native_path = %path, "Route mounted");
        }
        Ok(())
    }

    /// Self-contained JSON Schema document for a named schema.
    #[must_use]
    pub fn schema_document(&self, name: &str, host: Option<&str>) -> Option<Value> {
        let id = Dispatcher::new(&self.config, &self.transformers)
            .host(host)
            .schema_url(name);
        self.registry.document(name, Some(&id))
    }

    /// Run the full pipeline for one request.
    ///
    /// Never fails: every outcome, including unknown routes and cancellation,
    /// is expressed as a [`WireResponse`].
    pub fn handle(&self, mut request: RequestParts) -> WireResponse {
        let request_id = RequestId::from_headers(&request.headers);
        let span = info_span!(
            "request",
            request_id = %request_id,
            method = %request.method,
            path = %request.path(),
        );
        let _enter = span.enter();
        let start = Instant::now();

        let body = request.take_body();
        let response = self.dispatch(&request, body, request_id);

        info!(
            status = response.status,
            duration_us = start.elapsed().as_micros(),
            body_bytes = response.body.len(),
            "Request completed"
        );
        response
    }

    fn dispatch(
        &self,
        request: &RequestParts,
        body: Box<dyn std::io::Read + Send>,
        request_id: RequestId,
    ) -> WireResponse {
        let dispatcher = Dispatcher::new(&self.config, &self.transformers)
            .accept(request.get_header("accept"))
            .host(request.get_header("host"));
        let path = request.path();

        if let Some(name) = self.schema_request(&request.method, path) {
            return self.serve_schema(&dispatcher, name);
        }

        let Some(route) = self.router.route(&request.method, path) else {
            let err = StatusError::not_found(format!("no operation for {} {path}", request.method));
            return dispatcher.error(&err.into());
        };
        let meta = &route.operation;
        let Some(handler) = self.handlers.get(&meta.operation_id) else {
            return dispatcher.error(&ApiError::InternalFailure(format!(
                "no handler registered for `{}`",
                meta.operation_id
            )));
        };
        if request.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
            return dispatcher.error(&ApiError::Cancelled);
        }

        // The size limit is enforced before any parameter is looked at.
        let payload = if meta.body.is_some() {
            match read_body(body, meta.max_body_bytes, request.content_length()) {
                Ok(payload) => payload,
                Err(err) => return dispatcher.error(&err),
            }
        } else {
            Vec::new()
        };

        let query = request
            .query_string()
            .map(parse_query_params)
            .unwrap_or_default();
        let validator = Validator::new(&self.registry).strict_one_of(self.config.strict_one_of);
        let values = RequestValues {
            path: &route.path_params,
            query: &query,
            headers: &request.headers,
            body: &payload,
            content_type: request.get_header("content-type"),
            cancel: request.cancel.as_ref(),
        };
        let (bound, errors) = match bind_request(meta, &values, &validator) {
            Ok(bound) => bound,
            Err(err) => return dispatcher.error(&err),
        };

        let ctx = Context {
            request_id,
            operation: meta,
            method: &request.method,
            path,
            headers: &request.headers,
            path_params: &route.path_params,
            query: &query,
            cancel: request.cancel.as_ref(),
        };
        match handler(&ctx, bound, errors) {
            Ok(parts) if ctx.is_cancelled() => {
                drop(parts);
                dispatcher.error(&ApiError::Cancelled)
            }
            Ok(parts) => dispatcher.output(meta, parts),
            Err(err) => dispatcher.error(&err),
        }
    }

    /// Name of the schema requested by `GET {schemas_path}/{Name}.json`.
    fn schema_request<'p>(&self, method: &Method, path: &'p str) -> Option<&'p str> {
        if method != Method::GET {
            return None;
        }
        let rest = path.strip_prefix(self.config.schemas_path.trim_end_matches('/'))?;
        let name = rest.strip_prefix('/')?.strip_suffix(".json")?;
        (!name.is_empty() && !name.contains('/')).then_some(name)
    }

    fn serve_schema(&self, dispatcher: &Dispatcher<'_>, name: &str) -> WireResponse {
        let id = dispatcher.schema_url(name);
        let Some(doc) = self.registry.document(name, Some(&id)) else {
            warn!(schema_name = name, "Unknown schema requested");
            let err = StatusError::not_found(format!("schema `{name}` not found"));
            return dispatcher.error(&err.into());
        };
        match serde_json::to_vec_pretty(&doc) {
            Ok(bytes) => {
                let mut response = WireResponse::new(200);
                response
                    .headers
                    .push((Arc::from("content-type"), "application/schema+json".to_string()));
                response.body = bytes;
                response
            }
            Err(err) => dispatcher.error(&ApiError::InternalFailure(err.to_string())),
        }
    }
}
