//! # Schema Module
//!
//! Type-driven schema derivation.
//!
//! - [`Describe`] lets a Rust type describe its structure (derivable)
//! - [`SchemaRegistry`] turns descriptions into shared [`Schema`] graphs,
//!   memoized per type and named for reuse and export
//! - [`Schema`] is the recursive shape-and-constraints model consumed by the
//!   validator, the binders and the schema document endpoint

mod describe;
mod model;
mod registry;

pub use describe::{
    CustomSchema, Describe, FieldDescription, FieldRole, ScalarKind, StructDescription, Tags,
    TypeDescription, TypeRef, Visit,
};
pub use model::{
    AdditionalProperties, Combinator, Constraints, Pattern, Schema, SchemaKind, SchemaRef,
    JSON_SCHEMA_DIALECT,
};
pub use registry::{default_schema_namer, SchemaRegistry, SCHEMA_PROPERTY};
