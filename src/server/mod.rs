//! # Server Module
//!
//! Transport-neutral request entry point.
//!
//! A host transport converts its request into [`RequestParts`], calls
//! [`Api::handle`] and writes the returned [`WireResponse`]. The pipeline per
//! request is: schema endpoint or route match, body read under the size
//! limit, parameter and body binding, typed decode, resolvers, handler, and
//! finally dispatch of the output or error.

mod request;
mod response;
mod service;

pub use request::{parse_query_params, CancelSignal, RequestParts};
pub use response::WireResponse;
pub use service::Api;
