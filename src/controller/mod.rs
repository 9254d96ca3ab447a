//! Controllers and their dispatch lifecycle.
//!
//! # Data Flow
//! ```text
//! Matched request (after the route's middleware chain)
//!     → dispatch.rs (Dispatcher: pick shape, bind context)
//!     → context.rs (RequestContext: accessors + response vocabulary)
//!     → Controller::handle_request
//!     → Outcome: Responded | Synthesized | ErrorHandled | ErrorForwarded
//! ```
//!
//! # Design Decisions
//! - Controller shape (function vs instance) is resolved once, at declaration
//! - Per-request state lives in a fresh `RequestContext`, never on the controller
//! - Every dispatch ends in exactly one terminal outcome

pub mod context;
pub mod dispatch;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::{HandlerError, HandlerResult};

pub use context::RequestContext;
pub use dispatch::{error_handler, DispatchOutcome, Dispatcher, ErrorHandler, RouteErrorHandler};

/// Business logic for one endpoint.
///
/// Implementations must either produce a response through the context's
/// helpers or delegate with [`RequestContext::next`]. Keeping the default
/// `handle_request` is reported as [`HandlerError::NotImplemented`].
#[async_trait]
pub trait Controller: Send + Sync + 'static {
    async fn handle_request(&self, ctx: &mut RequestContext) -> HandlerResult {
        let _ = ctx;
        Err(HandlerError::NotImplemented(short_type_name::<Self>()))
    }
}

pub(crate) type FunctionHandler = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// The two controller shapes a route accepts.
#[derive(Clone)]
pub enum ControllerKind {
    /// A plain function owning the whole request; no lifecycle is attached.
    Function(FunctionHandler),
    /// A long-lived controller driven through a fresh context per request.
    Instance {
        name: String,
        controller: Arc<dyn Controller>,
    },
}

impl ControllerKind {
    /// Wrap a plain async function.
    pub fn function<F, Fut, R>(f: F) -> Self
    where
        F: Fn(Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse + 'static,
    {
        Self::Function(Arc::new(move |req| f(req).map(IntoResponse::into_response).boxed()))
    }

    /// Wrap a controller instance.
    pub fn instance<C: Controller>(controller: C) -> Self {
        Self::Instance {
            name: short_type_name::<C>(),
            controller: Arc::new(controller),
        }
    }

    /// Name used in logs.
    pub fn name(&self) -> &str {
        match self {
            Self::Function(_) => "fn",
            Self::Instance { name, .. } => name,
        }
    }
}

impl<C: Controller> From<C> for ControllerKind {
    fn from(controller: C) -> Self {
        Self::instance(controller)
    }
}

impl fmt::Debug for ControllerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function(_) => f.write_str("Function"),
            Self::Instance { name, .. } => f.debug_tuple("Instance").field(name).finish(),
        }
    }
}

/// Type name without its module path or generic arguments.
pub(crate) fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}
