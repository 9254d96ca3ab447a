//! Adapts user middleware into chain stages.
//!
//! The stage owns the continuation: the middleware receives `Next` by value,
//! so it can pass control downstream once or not at all. An error returned
//! by the middleware is turned into a forwarded-error response.

use crate::http::middleware::{Middleware, Stage, StageKind};
use crate::http::response::forward_error;

pub(crate) fn managed(kind: StageKind, middleware: &Middleware) -> Stage {
    let middleware = middleware.clone();
    Stage::new(kind, move |req, next| {
        let middleware = middleware.clone();
        async move {
            match middleware.call(req, next).await {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!(
                        stage = %kind,
                        middleware = middleware.name(),
                        error = %err,
                        "Middleware failed, forwarding error"
                    );
                    forward_error(err)
                }
            }
        }
    })
}

/// Map a list of middleware to stages of one kind, preserving order.
pub(crate) fn managed_all(kind: StageKind, middleware: &[Middleware]) -> impl Iterator<Item = Stage> + '_ {
    middleware.iter().map(move |m| managed(kind, m))
}
