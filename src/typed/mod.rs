//! # Typed Module
//!
//! Typed request and response handling.
//!
//! Handlers take a [`Context`] and an [`Input`] value and return an
//! [`Output`] value or an [`ApiError`](crate::error::ApiError):
//!
//! ```rust,ignore
//! use brrtbind::{Context, Input, Output, ApiError};
//!
//! #[derive(Input)]
//! struct GetPet {
//!     #[bind(path = "id", max_length = 32)]
//!     id: String,
//!     #[bind(query = "verbose")]
//!     verbose: Option<bool>,
//! }
//!
//! #[derive(Output)]
//! struct GetPetOutput {
//!     #[output(header = "ETag")]
//!     etag: String,
//!     body: Pet,
//! }
//!
//! fn get_pet(_ctx: &Context<'_>, input: GetPet) -> Result<GetPetOutput, ApiError> {
//!     // ...
//! }
//! ```
//!
//! `Input` derives bind fields from path, query, header or body; `Output`
//! derives declare header fields, an optional dynamic status field and one or
//! more body shapes. The first present shape is written.

mod core;

pub use core::*;
