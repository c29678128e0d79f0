//! # Validator Module
//!
//! Exhaustive validation of decoded values against a [`Schema`](crate::schema::Schema).
//!
//! Every violation is reported as an [`ErrorDetail`](crate::error::ErrorDetail)
//! whose location is a structural path (`body.items[2].name`) maintained by a
//! [`PathBuffer`]. Supported keywords: type, required, minLength/maxLength,
//! minimum/maximum (inclusive and exclusive), minItems/maxItems, pattern, enum,
//! items, properties/additionalProperties, oneOf/anyOf and named references.

mod core;
mod path;

pub use core::Validator;
pub use path::{PathBuffer, PathGuard, Segment, MAX_INLINE_DEPTH};
