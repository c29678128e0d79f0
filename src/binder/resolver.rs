use crate::error::{ApiError, ErrorDetail};
use crate::schema::Describe;
use crate::typed::Context;
use crate::validator::PathBuffer;
use tracing::debug;

/// Semantic validation hook run after a request has been bound.
///
/// Returned details without a location are anchored at the node's path. An
/// `Err` aborts the request and is answered as is.
///
/// ```rust,ignore
/// impl Resolver for CreateUser {
///     fn resolve(&self, ctx: &Context<'_>, _path: &PathBuffer) -> Result<Vec<ErrorDetail>, ApiError> {
///         if ctx.get_header("x-tenant").is_none() {
///             return Err(StatusError::forbidden("tenant required").into());
///         }
///         Ok(Vec::new())
///     }
/// }
/// ```
pub trait Resolver {
    fn resolve(&self, ctx: &Context<'_>, path: &PathBuffer) -> Result<Vec<ErrorDetail>, ApiError>;
}

/// Run every resolver reachable from `root` in pre-order.
pub(crate) fn run_resolvers(
    root: &dyn Describe,
    ctx: &Context<'_>,
    errors: &mut Vec<ErrorDetail>,
) -> Result<(), ApiError> {
    let mut path = PathBuffer::new();
    visit(root, ctx, &mut path, errors)
}

fn visit(
    node: &dyn Describe,
    ctx: &Context<'_>,
    path: &mut PathBuffer,
    errors: &mut Vec<ErrorDetail>,
) -> Result<(), ApiError> {
    if let Some(resolver) = node.resolver() {
        let details = resolver.resolve(ctx, path)?;
        debug!(location = %path, count = details.len(), "Resolver ran");
        for mut detail in details {
            if detail.location.is_none() && !path.is_empty() {
                detail.location = Some(path.to_string());
            }
            errors.push(detail);
        }
    }

    let mut outcome = Ok(());
    node.walk(&mut |segment, child| {
        if outcome.is_err() {
            return;
        }
        let mut guard = path.push(segment);
        outcome = visit(child, ctx, &mut guard, errors);
    });
    outcome
}
