//! Application error pipeline.
//!
//! Errors forwarded by controllers and middleware arrive as placeholder
//! responses tagged with [`ForwardedError`]. This outermost layer swaps the
//! placeholder for whatever the application error handler renders.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tower_http::request_id::RequestId;

use crate::error::HandlerError;
use crate::http::response::{self, ForwardedError};

/// Request facts available to the application error handler.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub method: Method,
    pub path: String,
    pub request_id: Option<String>,
}

/// Renders a forwarded error into the final response.
pub type AppErrorHandler = Arc<dyn Fn(&HandlerError, &ErrorContext) -> Response + Send + Sync>;

/// Log the error and answer with its status and a `{ "message" }` body.
///
/// Server errors never expose their message to the client.
pub fn default_error_handler(err: &HandlerError, ctx: &ErrorContext) -> Response {
    let status = err.status();
    if status.is_server_error() {
        tracing::error!(
            method = %ctx.method,
            path = %ctx.path,
            request_id = ctx.request_id.as_deref().unwrap_or("-"),
            error = %err,
            "Unhandled error"
        );
        response::message(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    } else {
        tracing::debug!(method = %ctx.method, path = %ctx.path, error = %err, "Request error");
        response::message(status, &err.to_string())
    }
}

pub(crate) async fn render_forwarded(handler: AppErrorHandler, req: Request, next: Next) -> Response {
    let ctx = ErrorContext {
        method: req.method().clone(),
        path: req.uri().path().to_string(),
        request_id: req
            .extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
            .map(str::to_string),
    };

    let mut response = next.run(req).await;
    match response.extensions_mut().remove::<ForwardedError>() {
        Some(ForwardedError(err)) => handler(err.as_ref(), &ctx),
        None => response,
    }
}
