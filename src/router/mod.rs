//! # Router Module
//!
//! Path matching for registered operations.
//!
//! Operation paths such as `/users/{id}` are compiled into anchored regexes
//! when the operation is registered. Each request is tested against the
//! routes of its method in registration order; the first match yields the
//! operation descriptor and the percent-decoded path parameters.
//!
//! Hosts that bring their own router can receive every operation through a
//! [`RouteAdapter`], with paths rewritten to `:name` syntax by
//! [`to_colon_path`] where needed.

mod core;

pub use core::{
    path_param_names, to_colon_path, to_regex_pattern, ParamVec, RouteAdapter, RouteMatch, Router,
    MAX_INLINE_PARAMS,
};
