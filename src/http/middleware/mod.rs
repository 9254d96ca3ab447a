//! Per-route middleware chains.
//!
//! # Data Flow
//! ```text
//! Route / Subroute declaration
//!     → chain.rs (ChainBuilder: fixed stage order)
//!         1. pre            (managed.rs)
//!         2. authorization  (authorization.rs)
//!         3. validation     (validation.rs)
//!         4. middleware     (managed.rs)
//!         5. file upload    (upload.rs)
//!     → Chain layered onto the route in that order
//!     → controller dispatch (terminal handler)
//! ```
//!
//! # Design Decisions
//! - Stages that have nothing to do are omitted, never stubbed
//! - Every stage receives an owned `Next`; it can continue at most once
//! - User middleware errors are forwarded to the error pipeline

pub mod authorization;
pub mod chain;
pub mod errors;
pub mod managed;
pub mod upload;
pub mod validation;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::error::HandlerError;

pub use chain::{Chain, ChainBuilder, StageConfig};

type MiddlewareFn =
    dyn Fn(Request, Next) -> BoxFuture<'static, Result<Response, HandlerError>> + Send + Sync;

/// User-supplied request processing step.
///
/// Call `next.run(req)` to continue the chain, return a response to
/// short-circuit it, or return an error to hand it to the error pipeline.
#[derive(Clone)]
pub struct Middleware {
    name: Arc<str>,
    f: Arc<MiddlewareFn>,
}

impl Middleware {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
    {
        Self::named("middleware", f)
    }

    /// Same as [`Middleware::new`], with a name used in logs.
    pub fn named<F, Fut>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Response, HandlerError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(move |req, next| f(req, next).boxed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self, req: Request, next: Next) -> BoxFuture<'static, Result<Response, HandlerError>> {
        (self.f)(req, next)
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Middleware").field(&self.name).finish()
    }
}

/// Position of a stage in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Pre,
    Authorization,
    SchemaValidation,
    Middleware,
    FileUploadValidation,
    Controller,
}

impl StageKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pre => "pre",
            Self::Authorization => "authorization",
            Self::SchemaValidation => "schema_validation",
            Self::Middleware => "middleware",
            Self::FileUploadValidation => "file_upload_validation",
            Self::Controller => "controller",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type StageFn = dyn Fn(Request, Next) -> BoxFuture<'static, Response> + Send + Sync;

/// One compiled entry of a chain.
#[derive(Clone)]
pub struct Stage {
    kind: StageKind,
    run: Arc<StageFn>,
}

impl Stage {
    pub(crate) fn new<F, Fut>(kind: StageKind, f: F) -> Self
    where
        F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            kind,
            run: Arc::new(move |req, next| f(req, next).boxed()),
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    pub(crate) fn runner(&self) -> Arc<StageFn> {
        self.run.clone()
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Stage").field(&self.kind).finish()
    }
}
