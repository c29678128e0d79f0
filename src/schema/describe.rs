//! Structural self-description of Rust types.
//!
//! [`Describe`] is the reflection seam of the crate: every type that appears in
//! an input, a request body or a response body describes its shape once, and
//! the [`SchemaRegistry`](super::SchemaRegistry) turns that description into a
//! [`Schema`](super::Schema). Implementations for structs and unit enums are
//! generated by `#[derive(Describe)]`.
//!
//! The trait also carries the resolver walk: [`Describe::walk`] visits child
//! values in declaration order and [`Describe::resolver`] exposes an optional
//! semantic validation hook for the current node.

use super::registry::SchemaRegistry;
use super::Schema;
use crate::binder::Resolver;
use crate::error::SchemaError;
use crate::validator::Segment;
use serde_json::Value;
use std::any::TypeId;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Visitor handed to [`Describe::walk`].
pub type Visit<'v> = dyn FnMut(Segment<'_>, &dyn Describe) + 'v;

/// A type that can describe its structure and expose resolver hooks.
pub trait Describe: 'static {
    /// Describe the structure of the type.
    fn describe() -> TypeDescription
    where
        Self: Sized;

    /// Visit nested values that may carry resolvers, in declaration order.
    fn walk(&self, _visit: &mut Visit<'_>) {}

    /// Semantic validation hook for this value, if any.
    fn resolver(&self) -> Option<&dyn Resolver> {
        None
    }
}

/// Lightweight handle to a describable type.
///
/// Holds the `TypeId` used for memoization and cycle detection, the Rust type
/// name used for naming, and a function pointer to the description.
#[derive(Clone, Copy)]
pub struct TypeRef {
    pub id: TypeId,
    pub type_name: &'static str,
    describe: fn() -> TypeDescription,
}

impl TypeRef {
    #[must_use]
    pub fn of<T: Describe>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            describe: T::describe,
        }
    }

    #[must_use]
    pub fn describe(&self) -> TypeDescription {
        (self.describe)()
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TypeRef").field(&self.type_name).finish()
    }
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Scalar value categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Integer { signed: bool, bits: u8 },
    Float { bits: u8 },
    String,
    /// RFC 3339 timestamp, decoded as `chrono::DateTime<Utc>`.
    DateTime,
    /// Calendar date (`%Y-%m-%d`), decoded as `chrono::NaiveDate`.
    Date,
}

impl ScalarKind {
    /// Inclusive integer bounds for the width, `None` for non-integers.
    #[must_use]
    pub fn integer_bounds(&self) -> Option<(i128, i128)> {
        match *self {
            ScalarKind::Integer { signed: true, bits } => {
                let max = (1i128 << (bits - 1)) - 1;
                Some((-max - 1, max))
            }
            ScalarKind::Integer { signed: false, bits } => Some((0, (1i128 << bits) - 1)),
            _ => None,
        }
    }
}

/// Custom schema builder for types that cannot be described structurally.
pub type CustomSchema = fn(&mut SchemaRegistry, bool) -> Result<Schema, SchemaError>;

/// Structural description of a type.
#[derive(Debug, Clone)]
pub enum TypeDescription {
    Scalar(ScalarKind),
    /// String-valued enumeration.
    Enum {
        schema_name: Option<&'static str>,
        values: &'static [&'static str],
    },
    Optional(TypeRef),
    /// Same schema as the wrapped type (`Box<T>`).
    Boxed(TypeRef),
    List(TypeRef),
    /// Map with string keys.
    Map(TypeRef),
    Struct(StructDescription),
    /// Any JSON value.
    Any,
    /// No value at all; used by empty response shapes.
    Unit,
    Custom(CustomSchema),
}

#[derive(Debug, Clone, Default)]
pub struct StructDescription {
    /// Explicit schema name; derived from the type name when absent.
    pub schema_name: Option<&'static str>,
    pub doc: Option<&'static str>,
    /// Reject properties that are not declared.
    pub deny_unknown: bool,
    pub fields: Vec<FieldDescription>,
}

/// Where a field's value comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRole {
    /// Member of a structured document.
    Property,
    Path,
    Query,
    Header,
    /// The decoded request body.
    Body,
    /// The raw request payload bytes.
    RawBody,
}

impl FieldRole {
    /// Location prefix used in error details.
    #[must_use]
    pub fn source(&self) -> &'static str {
        match self {
            FieldRole::Property => "",
            FieldRole::Path => "path",
            FieldRole::Query => "query",
            FieldRole::Header => "header",
            FieldRole::Body | FieldRole::RawBody => "body",
        }
    }

    #[must_use]
    pub fn is_parameter(&self) -> bool {
        matches!(self, FieldRole::Path | FieldRole::Query | FieldRole::Header)
    }
}

/// Declared constraints and documentation on a field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tags {
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub exclusive_minimum: Option<f64>,
    pub exclusive_maximum: Option<f64>,
    pub min_items: Option<u64>,
    pub max_items: Option<u64>,
    pub pattern: Option<&'static str>,
    pub enum_values: &'static [&'static str],
    pub format: Option<&'static str>,
    /// `chrono` format string for date/time parameters.
    pub time_format: Option<&'static str>,
    pub read_only: bool,
}

impl Tags {
    pub const EMPTY: Tags = Tags {
        min_length: None,
        max_length: None,
        minimum: None,
        maximum: None,
        exclusive_minimum: None,
        exclusive_maximum: None,
        min_items: None,
        max_items: None,
        pattern: None,
        enum_values: &[],
        format: None,
        time_format: None,
        read_only: false,
    };

    /// True when any validation constraint is declared.
    #[must_use]
    pub fn has_constraints(&self) -> bool {
        self.min_length.is_some()
            || self.max_length.is_some()
            || self.minimum.is_some()
            || self.maximum.is_some()
            || self.exclusive_minimum.is_some()
            || self.exclusive_maximum.is_some()
            || self.min_items.is_some()
            || self.max_items.is_some()
            || self.pattern.is_some()
            || !self.enum_values.is_empty()
    }
}

impl Default for Tags {
    fn default() -> Self {
        Tags::EMPTY
    }
}

/// One field of a described struct.
#[derive(Debug, Clone)]
pub struct FieldDescription {
    /// Wire name: property key, or parameter name for path/query/header fields.
    pub name: &'static str,
    pub role: FieldRole,
    pub ty: TypeRef,
    pub required: bool,
    /// Default as written in the declaration; coerced per field type.
    pub default: Option<&'static str>,
    pub tags: Tags,
    pub doc: Option<&'static str>,
    /// Documented content type for body fields.
    pub content_type: Option<&'static str>,
}

impl FieldDescription {
    /// A required document property.
    #[must_use]
    pub fn property(name: &'static str, ty: TypeRef) -> Self {
        Self {
            name,
            role: FieldRole::Property,
            ty,
            required: true,
            default: None,
            tags: Tags::EMPTY,
            doc: None,
            content_type: None,
        }
    }

    /// An optional request parameter.
    #[must_use]
    pub fn parameter(role: FieldRole, name: &'static str, ty: TypeRef) -> Self {
        Self {
            required: role == FieldRole::Path,
            role,
            ..Self::property(name, ty)
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn doc(mut self, doc: &'static str) -> Self {
        self.doc = Some(doc);
        self
    }

    #[must_use]
    pub fn tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }

    #[must_use]
    pub fn default_value(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    /// Location string used in error details, e.g. `query.limit`.
    #[must_use]
    pub fn location(&self) -> String {
        match self.role {
            FieldRole::Property => self.name.to_string(),
            FieldRole::Body | FieldRole::RawBody => "body".to_string(),
            role => format!("{}.{}", role.source(), self.name),
        }
    }
}

macro_rules! describe_scalar {
    ($kind:expr => $($ty:ty),+ $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe() -> TypeDescription {
                    TypeDescription::Scalar($kind)
                }
            }
        )+
    };
}

macro_rules! describe_int {
    ($($ty:ty => $signed:expr),+ $(,)?) => {
        $(
            impl Describe for $ty {
                fn describe() -> TypeDescription {
                    TypeDescription::Scalar(ScalarKind::Integer {
                        signed: $signed,
                        bits: <$ty>::BITS as u8,
                    })
                }
            }
        )+
    };
}

describe_scalar!(ScalarKind::Bool => bool);
describe_scalar!(ScalarKind::String => String, &'static str, char);
describe_scalar!(ScalarKind::Float { bits: 32 } => f32);
describe_scalar!(ScalarKind::Float { bits: 64 } => f64);
describe_scalar!(ScalarKind::DateTime => chrono::DateTime<chrono::Utc>);
describe_scalar!(ScalarKind::Date => chrono::NaiveDate);
describe_int!(
    i8 => true, i16 => true, i32 => true, i64 => true, isize => true,
    u8 => false, u16 => false, u32 => false, u64 => false, usize => false,
);

impl Describe for Value {
    fn describe() -> TypeDescription {
        TypeDescription::Any
    }
}

impl Describe for () {
    fn describe() -> TypeDescription {
        TypeDescription::Unit
    }
}

impl<T: Describe> Describe for Option<T> {
    fn describe() -> TypeDescription {
        TypeDescription::Optional(TypeRef::of::<T>())
    }

    fn walk(&self, visit: &mut Visit<'_>) {
        if let Some(inner) = self {
            inner.walk(visit);
        }
    }

    fn resolver(&self) -> Option<&dyn Resolver> {
        self.as_ref().and_then(|inner| inner.resolver())
    }
}

impl<T: Describe> Describe for Box<T> {
    fn describe() -> TypeDescription {
        TypeDescription::Boxed(TypeRef::of::<T>())
    }

    fn walk(&self, visit: &mut Visit<'_>) {
        (**self).walk(visit);
    }

    fn resolver(&self) -> Option<&dyn Resolver> {
        (**self).resolver()
    }
}

impl<T: Describe> Describe for Vec<T> {
    fn describe() -> TypeDescription {
        TypeDescription::List(TypeRef::of::<T>())
    }

    fn walk(&self, visit: &mut Visit<'_>) {
        // Scalars never carry resolvers; skip per-element visits for byte buffers and the like.
        if matches!(T::describe(), TypeDescription::Scalar(_)) {
            return;
        }
        for (index, item) in self.iter().enumerate() {
            visit(Segment::Index(index), item as &dyn Describe);
        }
    }
}

impl<T: Describe> Describe for BTreeMap<String, T> {
    fn describe() -> TypeDescription {
        TypeDescription::Map(TypeRef::of::<T>())
    }

    fn walk(&self, visit: &mut Visit<'_>) {
        for (key, value) in self {
            visit(Segment::Key(key), value as &dyn Describe);
        }
    }
}

impl<T: Describe, S: std::hash::BuildHasher + 'static> Describe for HashMap<String, T, S> {
    fn describe() -> TypeDescription {
        TypeDescription::Map(TypeRef::of::<T>())
    }

    fn walk(&self, visit: &mut Visit<'_>) {
        // Sorted so resolver output is stable across runs.
        let mut keys: Vec<&String> = self.keys().collect();
        keys.sort();
        for key in keys {
            if let Some(value) = self.get(key) {
                visit(Segment::Key(key), value as &dyn Describe);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_bounds() {
        assert_eq!(
            ScalarKind::Integer { signed: true, bits: 8 }.integer_bounds(),
            Some((-128, 127))
        );
        assert_eq!(
            ScalarKind::Integer { signed: false, bits: 32 }.integer_bounds(),
            Some((0, u32::MAX as i128))
        );
        assert_eq!(ScalarKind::String.integer_bounds(), None);
    }

    #[test]
    fn test_vec_walk_visits_indices_in_order() {
        let items = vec![vec![1u8], vec![2], vec![3]];
        let mut seen = Vec::new();
        items.walk(&mut |seg, _| seen.push(seg.to_string()));
        assert_eq!(seen, vec!["[0]", "[1]", "[2]"]);

        let bytes = vec![1u8, 2, 3];
        let mut visited = 0;
        bytes.walk(&mut |_, _| visited += 1);
        assert_eq!(visited, 0);
    }

    #[test]
    fn test_hash_map_walk_is_sorted() {
        let mut map = HashMap::new();
        map.insert("b".to_string(), 1u8);
        map.insert("a".to_string(), 2u8);
        let mut seen = Vec::new();
        map.walk(&mut |seg, _| seen.push(seg.to_string()));
        assert_eq!(seen, vec![".a", ".b"]);
    }

    #[test]
    fn test_field_locations() {
        let f = FieldDescription::parameter(FieldRole::Query, "limit", TypeRef::of::<u32>());
        assert_eq!(f.location(), "query.limit");
        assert!(!f.required);
        let f = FieldDescription::parameter(FieldRole::Path, "id", TypeRef::of::<String>());
        assert_eq!(f.location(), "path.id");
        assert!(f.required);
    }
}
