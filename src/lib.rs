//! Declarative route trees compiled into axum routers.
//!
//! An application describes its endpoints as a [`RouterTree`]: routes with a
//! controller, optional validation schema, authorizer, middleware and
//! pre-handlers, plus subtrees mounted at a prefix. [`RouterFactory`]
//! compiles the tree once at startup, rejecting duplicate endpoints, and
//! [`HttpServer`] serves it behind the ambient tower stack.

pub mod config;
pub mod controller;
pub mod demo;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod tree;

pub use config::AppConfig;
pub use controller::{Controller, ControllerKind, RequestContext};
pub use error::{ComposeError, HandlerError, HandlerResult};
pub use http::{AppOptions, HttpServer};
pub use lifecycle::Shutdown;
pub use routing::RouterFactory;
pub use tree::{Method, Route, RouterTree, Subroute};
