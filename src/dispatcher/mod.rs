//! # Dispatcher Module
//!
//! Writes handler outputs and errors as wire responses.
//!
//! ## Output flow
//!
//! 1. The first present shape of the output value is selected
//! 2. Headers not allowed by that shape are dropped
//! 3. The status is committed: shape status, the operation default when no
//!    shape is present, or the output's dynamic status field
//! 4. The body is written: raw bytes verbatim, structured values marshaled,
//!    linked to their schema with `$schema`, passed through transformers and
//!    encoded in the negotiated [`Format`]
//!
//! Marshaling, transformer and encoding failures happen after the status is
//! committed. They replace the body with a short plain-text diagnostic and
//! keep the committed status.
//!
//! ## Errors
//!
//! Errors are written as [`ErrorModel`](crate::error::ErrorModel) problem
//! documents. Cancelled requests get status 499 and no body.

mod core;

pub use core::{
    Dispatcher, Format, HeaderVec, Payload, ResponseWriter, TransformContext, Transformer,
    MAX_INLINE_HEADERS,
};
