//! Controller dispatch.
//!
//! # Responsibilities
//! - Invoke function controllers directly
//! - Bind a fresh [`RequestContext`] for instance controllers
//! - Route controller errors to the route error handler or the pipeline
//! - Guarantee a response when a controller neither answers nor delegates
//!
//! # Design Decisions
//! - Panics in a controller are caught and treated as errors
//! - An error raised after a response was produced is logged, not re-sent
//! - The outcome is attached to the response as a [`DispatchOutcome`] extension

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use futures_util::FutureExt;

use crate::controller::context::{Lifecycle, RequestContext};
use crate::controller::{Controller, ControllerKind};
use crate::error::{HandlerError, HandlerResult};
use crate::http::response::{self, forward_error};
use crate::observability::metrics;

/// Per-route recovery for errors raised by an instance controller.
///
/// The handler answers through the context, delegates with
/// [`RequestContext::next`], or returns an error to forward it.
#[async_trait]
pub trait RouteErrorHandler: Send + Sync + 'static {
    async fn handle_error(&self, err: HandlerError, ctx: &mut RequestContext) -> HandlerResult;
}

/// Shared route error handler, as stored on a [`Route`](crate::tree::Route).
pub type ErrorHandler = Arc<dyn RouteErrorHandler>;

/// Wrap a synchronous closure as an [`ErrorHandler`].
pub fn error_handler<F>(f: F) -> ErrorHandler
where
    F: Fn(HandlerError, &mut RequestContext) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(FnErrorHandler(f))
}

struct FnErrorHandler<F>(F);

#[async_trait]
impl<F> RouteErrorHandler for FnErrorHandler<F>
where
    F: Fn(HandlerError, &mut RequestContext) -> HandlerResult + Send + Sync + 'static,
{
    async fn handle_error(&self, err: HandlerError, ctx: &mut RequestContext) -> HandlerResult {
        (self.0)(err, ctx)
    }
}

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchOutcome {
    /// The controller produced the response.
    Responded,
    /// Nothing answered; a 500 was produced on the controller's behalf.
    Synthesized,
    /// The route error handler produced the response.
    ErrorHandled,
    /// The error went to the application error pipeline.
    ErrorForwarded,
}

impl DispatchOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Responded => "responded",
            Self::Synthesized => "no_response",
            Self::ErrorHandled => "error_handled",
            Self::ErrorForwarded => "error_forwarded",
        }
    }
}

impl fmt::Display for DispatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal handler of a route.
#[derive(Clone)]
pub struct Dispatcher {
    controller: ControllerKind,
    error_handler: Option<ErrorHandler>,
}

impl Dispatcher {
    pub fn new(controller: ControllerKind, error_handler: Option<ErrorHandler>) -> Self {
        Self {
            controller,
            error_handler,
        }
    }

    pub async fn dispatch(&self, req: Request) -> Response {
        match &self.controller {
            ControllerKind::Function(f) => f(req).await,
            ControllerKind::Instance { name, controller } => {
                let path = req.uri().path().to_string();
                let (mut response, outcome) = self.dispatch_instance(name, controller.as_ref(), req).await;

                metrics::record_dispatch(outcome.as_str());
                if outcome == DispatchOutcome::ErrorForwarded {
                    tracing::warn!(controller = %name, path = %path, "Forwarding controller error");
                }
                tracing::debug!(
                    controller = %name,
                    path = %path,
                    outcome = %outcome,
                    status = response.status().as_u16(),
                    "Dispatched"
                );
                response.extensions_mut().insert(outcome);
                response
            }
        }
    }

    async fn dispatch_instance(
        &self,
        name: &str,
        controller: &dyn Controller,
        req: Request,
    ) -> (Response, DispatchOutcome) {
        let mut ctx = match RequestContext::from_request(req).await {
            Ok(ctx) => ctx,
            Err(err) => return (forward_error(err), DispatchOutcome::ErrorForwarded),
        };

        let result = AssertUnwindSafe(controller.handle_request(&mut ctx))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic))));

        match (result, ctx.take_lifecycle()) {
            (Ok(()), Lifecycle::Responded(response)) => (response, DispatchOutcome::Responded),
            (Ok(()), Lifecycle::Delegated(err)) => (forward_error(err), DispatchOutcome::ErrorForwarded),
            (Ok(()), Lifecycle::Pending) => {
                tracing::error!(controller = %name, path = %ctx.path(), "Controller did not send any response");
                (no_response(), DispatchOutcome::Synthesized)
            }
            (Err(err), Lifecycle::Responded(response)) => {
                tracing::error!(
                    controller = %name,
                    path = %ctx.path(),
                    error = %err,
                    "Controller failed after responding"
                );
                (response, DispatchOutcome::Responded)
            }
            (Err(err), Lifecycle::Delegated(delegated)) => {
                tracing::error!(controller = %name, error = %err, "Controller failed after delegating");
                (forward_error(delegated), DispatchOutcome::ErrorForwarded)
            }
            (Err(err), Lifecycle::Pending) => match &self.error_handler {
                Some(handler) => recover(handler.as_ref(), err, &mut ctx).await,
                None => (forward_error(err), DispatchOutcome::ErrorForwarded),
            },
        }
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("controller", &self.controller)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

async fn recover(
    handler: &dyn RouteErrorHandler,
    err: HandlerError,
    ctx: &mut RequestContext,
) -> (Response, DispatchOutcome) {
    let result = AssertUnwindSafe(handler.handle_error(err, ctx))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic))));
    match (result, ctx.take_lifecycle()) {
        (_, Lifecycle::Responded(response)) => (response, DispatchOutcome::ErrorHandled),
        (Ok(()), Lifecycle::Delegated(err)) | (Err(err), Lifecycle::Pending) => {
            (forward_error(err), DispatchOutcome::ErrorForwarded)
        }
        (Err(err), Lifecycle::Delegated(delegated)) => {
            tracing::error!(error = %err, "Error handler failed after delegating");
            (forward_error(delegated), DispatchOutcome::ErrorForwarded)
        }
        (Ok(()), Lifecycle::Pending) => {
            tracing::error!(path = %ctx.path(), "Error handler did not send any response");
            (no_response(), DispatchOutcome::Synthesized)
        }
    }
}

fn no_response() -> Response {
    response::message(StatusCode::INTERNAL_SERVER_ERROR, "Server did not send any response")
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::ForwardedError;
    use async_trait::async_trait;
    use axum::body::Body;
    use serde_json::{json, Value};

    struct Hello;

    #[async_trait]
    impl Controller for Hello {
        async fn handle_request(&self, ctx: &mut RequestContext) -> HandlerResult {
            ctx.ok(json!({ "hello": "world" }))
        }
    }

    struct Silent;

    #[async_trait]
    impl Controller for Silent {
        async fn handle_request(&self, _ctx: &mut RequestContext) -> HandlerResult {
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Controller for Failing {
        async fn handle_request(&self, _ctx: &mut RequestContext) -> HandlerResult {
            Err(HandlerError::msg("Some error"))
        }
    }

    struct Panicking;

    #[async_trait]
    impl Controller for Panicking {
        async fn handle_request(&self, _ctx: &mut RequestContext) -> HandlerResult {
            panic!("kaboom")
        }
    }

    struct Unimplemented;

    impl Controller for Unimplemented {}

    fn request() -> Request {
        Request::builder().uri("/hello").body(Body::empty()).unwrap()
    }

    async fn run(dispatcher: Dispatcher) -> (StatusCode, DispatchOutcome, Option<ForwardedError>, Value) {
        let response = dispatcher.dispatch(request()).await;
        let status = response.status();
        let outcome = *response.extensions().get::<DispatchOutcome>().unwrap();
        let forwarded = response.extensions().get::<ForwardedError>().cloned();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, outcome, forwarded, body)
    }

    #[tokio::test]
    async fn test_responded() {
        let (status, outcome, _, body) = run(Dispatcher::new(Hello.into(), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome, DispatchOutcome::Responded);
        assert_eq!(body, json!({ "hello": "world" }));
    }

    #[tokio::test]
    async fn test_silent_controller_gets_synthesized_500() {
        let handler_called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = handler_called.clone();
        let handler = error_handler(move |_err, ctx| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
            ctx.bad_request(None)
        });

        let (status, outcome, _, body) = run(Dispatcher::new(Silent.into(), Some(handler))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(outcome, DispatchOutcome::Synthesized);
        assert_eq!(body, json!({ "message": "Server did not send any response" }));
        assert!(!handler_called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_error_handler_recovers() {
        let handler = error_handler(|err, ctx| {
            let message = err.to_string();
            ctx.internal_server_error(message.as_str(), None)
        });
        let (status, outcome, forwarded, body) = run(Dispatcher::new(Failing.into(), Some(handler))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(outcome, DispatchOutcome::ErrorHandled);
        assert!(forwarded.is_none());
        assert_eq!(body, json!({ "message": "Some error" }));
    }

    #[tokio::test]
    async fn test_error_handler_can_delegate() {
        let handler = error_handler(|err, ctx| ctx.next(err));
        let (_, outcome, forwarded, _) = run(Dispatcher::new(Failing.into(), Some(handler))).await;
        assert_eq!(outcome, DispatchOutcome::ErrorForwarded);
        assert_eq!(forwarded.unwrap().0.to_string(), "Some error");
    }

    struct Audited {
        log: Arc<tokio::sync::Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RouteErrorHandler for Audited {
        async fn handle_error(&self, err: HandlerError, ctx: &mut RequestContext) -> HandlerResult {
            self.log.lock().await.push(err.to_string());
            tokio::task::yield_now().await;
            ctx.conflict("Recorded")
        }
    }

    #[tokio::test]
    async fn test_async_error_handler_recovers() {
        let log = Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let handler: ErrorHandler = Arc::new(Audited { log: log.clone() });

        let (status, outcome, _, body) = run(Dispatcher::new(Failing.into(), Some(handler))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(outcome, DispatchOutcome::ErrorHandled);
        assert_eq!(body, json!({ "message": "Recorded" }));
        assert_eq!(*log.lock().await, vec!["Some error".to_string()]);
    }

    #[tokio::test]
    async fn test_error_without_handler_is_forwarded() {
        let (status, outcome, forwarded, _) = run(Dispatcher::new(Failing.into(), None)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(outcome, DispatchOutcome::ErrorForwarded);
        assert!(forwarded.is_some());
    }

    #[tokio::test]
    async fn test_panic_is_forwarded() {
        let (_, outcome, forwarded, _) = run(Dispatcher::new(Panicking.into(), None)).await;
        assert_eq!(outcome, DispatchOutcome::ErrorForwarded);
        assert!(matches!(*forwarded.unwrap().0, HandlerError::Panicked(ref m) if m == "kaboom"));
    }

    #[tokio::test]
    async fn test_unimplemented_controller_is_forwarded() {
        let (_, _, forwarded, _) = run(Dispatcher::new(Unimplemented.into(), None)).await;
        assert_eq!(
            forwarded.unwrap().0.to_string(),
            "'handleRequest' not implemented in Unimplemented"
        );
    }

    #[tokio::test]
    async fn test_function_controller_runs_directly() {
        let kind = ControllerKind::function(|_req: Request| async { (StatusCode::ACCEPTED, "done") });
        let response = Dispatcher::new(kind, None).dispatch(request()).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert!(response.extensions().get::<DispatchOutcome>().is_none());
    }
}
