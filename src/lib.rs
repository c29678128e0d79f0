//! # brrtbind
//!
//! **brrtbind** binds HTTP requests to typed Rust inputs, validates them exhaustively against
//! schemas derived from those same types, and dispatches typed outputs as wire responses.
//!
//! ## Overview
//!
//! An operation is declared once as a pair of Rust types: an input struct whose fields say
//! where each value comes from (path, query, header, body) and an output type describing the
//! possible response shapes. From these types brrtbind derives JSON Schemas, binds and
//! validates every request, and reports **all** problems at once in a single
//! `application/problem+json` document.
//!
//! ## Architecture
//!
//! - **[`schema`]** - [`Describe`] trait, schema model and memoizing [`SchemaRegistry`]
//! - **[`validator`]** - Exhaustive validation with structural error paths
//! - **[`operation`]** - Per-operation binding plans built at registration
//! - **[`binder`]** - Parameter coercion, body parsing and the [`Resolver`] walk
//! - **[`typed`]** - [`Input`] / [`Output`] traits, [`Context`] and handler erasure
//! - **[`dispatcher`]** - Shape selection, content negotiation, transformers, error bodies
//! - **[`router`]** - Path pattern matching and host router adapters
//! - **[`server`]** - Transport-neutral [`Api`] entry point
//! - **[`config`]** / **[`telemetry`]** - Configuration loading and `tracing` setup
//!
//! ### Request Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Host as Host transport
//!     participant Api
//!     participant Router
//!     participant Binder
//!     participant Handler
//!     participant Dispatcher
//!
//!     Host->>Api: handle(RequestParts)
//!     Api->>Router: route(method, path)
//!     Router-->>Api: RouteMatch (operation, path params)
//!     Api->>Binder: read body under the size limit (413)
//!     Api->>Binder: bind params, parse and validate body
//!     Binder-->>Api: BoundInput + errors
//!     Api->>Handler: decode Input, run resolvers (422 if any error)
//!     Handler-->>Api: Output or ApiError
//!     Api->>Dispatcher: select shape, commit status, encode
//!     Dispatcher-->>Host: WireResponse
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use brrtbind::{Api, ApiError, BindConfig, Context, Describe, Input, Operation, Output};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Deserialize, Describe)]
//! struct NewItem {
//!     #[bind(max_length = 10)]
//!     name: String,
//!     #[bind(minimum = 1)]
//!     count: i64,
//! }
//!
//! #[derive(Debug, Serialize, Describe)]
//! struct Item {
//!     id: String,
//!     name: String,
//! }
//!
//! #[derive(Input)]
//! struct PutItem {
//!     #[bind(path = "id", max_length = 5)]
//!     id: String,
//!     body: NewItem,
//! }
//!
//! #[derive(Output)]
//! struct PutItemOutput {
//!     #[output(header = "ETag")]
//!     etag: String,
//!     body: Item,
//! }
//!
//! fn put_item(_ctx: &Context<'_>, input: PutItem) -> Result<PutItemOutput, ApiError> {
//!     Ok(PutItemOutput {
//!         etag: format!("\"{}\"", input.id),
//!         body: Item { id: input.id, name: input.body.name },
//!     })
//! }
//!
//! let mut api = Api::new(BindConfig::from_env());
//! api.register(Operation::put("/items/{id}"), put_item)?;
//! let response = api.handle(request_parts);
//! ```
//!
//! ## Configuration
//!
//! [`BindConfig`] is loaded from YAML, JSON or TOML files and overlaid with `BRRTB_*`
//! environment variables. Logging is initialised once with
//! [`telemetry::init_logging`].

// Derive macros refer to `::brrtbind` paths; this makes them work inside the crate too.
extern crate self as brrtbind;

pub mod binder;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod ids;
pub mod operation;
pub mod router;
pub mod schema;
pub mod server;
pub mod telemetry;
pub mod typed;
pub mod validator;

pub use binder::{BoundInput, Resolver};
pub use brrtbind_macros::{Describe, Input, Output};
pub use config::BindConfig;
pub use dispatcher::{Format, Payload, TransformContext};
pub use error::{ApiError, ErrorDetail, ErrorModel, RegistrationError, SchemaError, StatusError};
pub use ids::RequestId;
pub use operation::Operation;
pub use router::RouteAdapter;
pub use schema::{Describe, SchemaRegistry};
pub use server::{Api, CancelSignal, RequestParts, WireResponse};
pub use typed::{Context, Input, Output, Reply};
pub use validator::PathBuffer;

/// Items used by code generated from the derive macros.
#[doc(hidden)]
pub mod __private {
    pub use crate::binder::BoundInput;
    pub use crate::dispatcher::Payload;
    pub use crate::error::BindError;
    pub use crate::schema::{
        FieldDescription, FieldRole, ScalarKind, StructDescription, Tags, TypeDescription,
        TypeRef, Visit,
    };
    pub use crate::typed::{
        IntoStatus, OutputDescription, OutputParts, ShapeBody, ShapeDescription, ToHeader,
    };
    pub use crate::validator::Segment;
    pub use serde_json::Value;
}
