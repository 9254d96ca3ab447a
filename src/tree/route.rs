//! Endpoint and subtree declarations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::controller::{ControllerKind, ErrorHandler};
use crate::http::middleware::authorization::Authorizer;
use crate::http::middleware::Middleware;
use crate::tree::method::Method;
use crate::tree::schema::ValidationSchema;
use crate::tree::RouterTree;

/// Documentation attached to a route. Opaque to composition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouteDoc(pub Value);

/// One endpoint declaration.
#[derive(Clone)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub controller: ControllerKind,
    pub validation_schema: Option<ValidationSchema>,
    pub authorizer: Option<Authorizer>,
    pub middleware: Vec<Middleware>,
    /// Run before authorization and validation.
    pub pre: Vec<Middleware>,
    pub error_handler: Option<ErrorHandler>,
    pub doc: Option<RouteDoc>,
}

macro_rules! verb_constructors {
    ($($name:ident => $method:ident),* $(,)?) => {
        $(
            pub fn $name(path: impl Into<String>, controller: impl Into<ControllerKind>) -> Self {
                Self::new(Method::$method, path, controller)
            }
        )*
    };
}

impl Route {
    pub fn new(method: Method, path: impl Into<String>, controller: impl Into<ControllerKind>) -> Self {
        Self {
            method,
            path: path.into(),
            controller: controller.into(),
            validation_schema: None,
            authorizer: None,
            middleware: Vec::new(),
            pre: Vec::new(),
            error_handler: None,
            doc: None,
        }
    }

    verb_constructors! {
        get => Get,
        post => Post,
        put => Put,
        patch => Patch,
        delete => Delete,
        head => Head,
        options => Options,
        all => All,
    }

    pub fn with_schema(mut self, schema: ValidationSchema) -> Self {
        self.validation_schema = Some(schema);
        self
    }

    pub fn with_authorizer(mut self, authorizer: Authorizer) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn with_pre(mut self, pre: Middleware) -> Self {
        self.pre.push(pre);
        self
    }

    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn with_doc(mut self, doc: Value) -> Self {
        self.doc = Some(RouteDoc(doc));
        self
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("controller", &self.controller)
            .field("authorizer", &self.authorizer)
            .field("middleware", &self.middleware.len())
            .field("pre", &self.pre.len())
            .finish_non_exhaustive()
    }
}

/// A nested tree mounted at a path prefix.
///
/// The link's own schema, authorizer, middleware and pre-handlers run in
/// front of every endpoint of the mounted tree.
#[derive(Clone, Debug)]
pub struct Subroute {
    pub path: String,
    pub router: RouterTree,
    pub validation_schema: Option<ValidationSchema>,
    pub authorizer: Option<Authorizer>,
    pub middleware: Vec<Middleware>,
    pub pre: Vec<Middleware>,
}

impl Subroute {
    pub fn new(path: impl Into<String>, router: RouterTree) -> Self {
        Self {
            path: path.into(),
            router,
            validation_schema: None,
            authorizer: None,
            middleware: Vec::new(),
            pre: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: ValidationSchema) -> Self {
        self.validation_schema = Some(schema);
        self
    }

    pub fn with_authorizer(mut self, authorizer: Authorizer) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn with_middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn with_pre(mut self, pre: Middleware) -> Self {
        self.pre.push(pre);
        self
    }
}
