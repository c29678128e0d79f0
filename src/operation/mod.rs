//! # Operation Module
//!
//! An [`Operation`] declares method, path and options; registration combines it
//! with the input and output types into an [`OperationMeta`]: the parameter
//! binding plan, the body plan and the allowed response shapes. The descriptor
//! is built once, validated eagerly and shared read-only by every request.

mod build;
mod types;

pub(crate) use build::build_operation;
pub use build::default_operation_id;
pub use types::{BodyMeta, Operation, OperationMeta, ParamMeta, ResponseShape, ShapeKind};
