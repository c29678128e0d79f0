use crate::binder::{run_resolvers, BoundInput};
use crate::dispatcher::Payload;
use crate::error::{ApiError, BindError, ErrorDetail};
use crate::ids::RequestId;
use crate::operation::OperationMeta;
use crate::router::ParamVec;
use crate::schema::{Describe, TypeRef};
use crate::server::CancelSignal;
use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, StatusCode};
use serde::Serialize;

/// Read-only view of the request handed to handlers and resolvers.
#[derive(Debug, Clone, Copy)]
pub struct Context<'a> {
    pub request_id: RequestId,
    pub operation: &'a OperationMeta,
    pub method: &'a Method,
    pub path: &'a str,
    pub headers: &'a HeaderMap,
    pub path_params: &'a ParamVec,
    pub query: &'a [(String, String)],
    pub cancel: Option<&'a CancelSignal>,
}

impl Context<'_> {
    /// Header value by case-insensitive name.
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Last query value for `name`.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .rfind(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(CancelSignal::is_cancelled)
    }
}

/// Typed request input, usually generated by `#[derive(Input)]`.
pub trait Input: Describe + Sized + Send + 'static {
    /// Decode the typed value from bound request values.
    fn from_bound(bound: &mut BoundInput) -> Result<Self, BindError>;
}

impl Input for () {
    fn from_bound(_bound: &mut BoundInput) -> Result<Self, BindError> {
        Ok(())
    }
}

/// Body of a declared response shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShapeBody {
    Empty,
    /// JSON/YAML document described by the type.
    Structured(TypeRef),
    /// Bytes written verbatim.
    Raw,
}

/// One response shape as declared by an output type.
#[derive(Debug, Clone)]
pub struct ShapeDescription {
    /// Defaults to 200, or 204 for empty bodies.
    pub status: Option<u16>,
    /// Header allowlist; `None` allows every declared header.
    pub headers: Option<&'static [&'static str]>,
    pub body: ShapeBody,
    pub content_type: Option<&'static str>,
}

/// Declared response structure of an output type.
#[derive(Debug, Clone, Default)]
pub struct OutputDescription {
    pub headers: Vec<&'static str>,
    pub shapes: Vec<ShapeDescription>,
    pub dynamic_status: bool,
}

/// Output values split for dispatch.
#[derive(Debug, Default)]
pub struct OutputParts {
    /// Dynamic status override.
    pub status: Option<u16>,
    /// Declared headers with their rendered values; `None` when absent.
    pub headers: Vec<(&'static str, Option<String>)>,
    /// Index of the first present shape and its payload.
    pub selected: Option<(usize, Payload)>,
}

/// Typed response, usually generated by `#[derive(Output)]`.
pub trait Output: Send + 'static {
    fn describe_output() -> OutputDescription
    where
        Self: Sized;

    fn into_parts(self) -> OutputParts;
}

impl Output for () {
    fn describe_output() -> OutputDescription {
        OutputDescription::default()
    }

    fn into_parts(self) -> OutputParts {
        OutputParts::default()
    }
}

/// A single structured `200` body.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T>(pub T);

impl<T: Describe + Serialize + Send> Output for Reply<T> {
    fn describe_output() -> OutputDescription {
        OutputDescription {
            headers: Vec::new(),
            shapes: vec![ShapeDescription {
                status: None,
                headers: None,
                body: ShapeBody::Structured(TypeRef::of::<T>()),
                content_type: None,
            }],
            dynamic_status: false,
        }
    }

    fn into_parts(self) -> OutputParts {
        OutputParts {
            selected: Some((0, Payload::structured(self.0))),
            ..OutputParts::default()
        }
    }
}

/// Rendering of output header fields.
pub trait ToHeader {
    /// `None` means the header is absent.
    fn to_header(&self) -> Option<String>;
}

impl ToHeader for String {
    fn to_header(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl ToHeader for &'static str {
    fn to_header(&self) -> Option<String> {
        Some((*self).to_string())
    }
}

macro_rules! to_header_display {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl ToHeader for $ty {
                fn to_header(&self) -> Option<String> {
                    Some(self.to_string())
                }
            }
        )+
    };
}

to_header_display!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl ToHeader for DateTime<Utc> {
    fn to_header(&self) -> Option<String> {
        Some(self.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
    }
}

impl<T: ToHeader> ToHeader for Option<T> {
    fn to_header(&self) -> Option<String> {
        self.as_ref().and_then(ToHeader::to_header)
    }
}

impl<T: ToHeader> ToHeader for Vec<T> {
    fn to_header(&self) -> Option<String> {
        let parts: Vec<String> = self.iter().filter_map(ToHeader::to_header).collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

/// Dynamic status field values.
pub trait IntoStatus {
    /// `None` keeps the shape status.
    fn into_status(self) -> Option<u16>;
}

impl IntoStatus for u16 {
    fn into_status(self) -> Option<u16> {
        (self != 0).then_some(self)
    }
}

impl IntoStatus for StatusCode {
    fn into_status(self) -> Option<u16> {
        Some(self.as_u16())
    }
}

impl<T: IntoStatus> IntoStatus for Option<T> {
    fn into_status(self) -> Option<u16> {
        self.and_then(IntoStatus::into_status)
    }
}

/// Handler with its input and output types erased.
pub(crate) type ErasedHandler = Box<
    dyn Fn(&Context<'_>, BoundInput, Vec<ErrorDetail>) -> Result<OutputParts, ApiError>
        + Send
        + Sync,
>;

/// Wrap a typed handler: decode input, run resolvers, call the handler.
pub(crate) fn erase<I, O, F>(handler: F) -> ErasedHandler
where
    I: Input,
    O: Output,
    F: Fn(&Context<'_>, I) -> Result<O, ApiError> + Send + Sync + 'static,
{
    Box::new(
        move |ctx: &Context<'_>, mut bound: BoundInput, mut errors: Vec<ErrorDetail>| {
            let input = match I::from_bound(&mut bound) {
                Ok(input) => input,
                Err(err) => {
                    // Decode failures only matter when nothing explains them already.
                    if errors.is_empty() {
                        errors.push(err.into_detail());
                    }
                    return Err(ApiError::ValidationFailed(errors));
                }
            };
            run_resolvers(&input, ctx, &mut errors)?;
            if !errors.is_empty() {
                return Err(ApiError::ValidationFailed(errors));
            }
            if ctx.is_cancelled() {
                return Err(ApiError::Cancelled);
            }
            handler(ctx, input).map(O::into_parts)
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_header_rendering() {
        let date = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(date.to_header().as_deref(), Some("Sun, 06 Nov 1994 08:49:37 GMT"));
        assert_eq!(true.to_header().as_deref(), Some("true"));
        assert_eq!(None::<u32>.to_header(), None);
        assert_eq!(vec![1u8, 2].to_header().as_deref(), Some("1, 2"));
        assert_eq!(Vec::<u8>::new().to_header(), None);
    }

    #[test]
    fn test_status_conversion() {
        assert_eq!(0u16.into_status(), None);
        assert_eq!(256u16.into_status(), Some(256));
        assert_eq!(Some(StatusCode::CREATED).into_status(), Some(201));
    }
}
