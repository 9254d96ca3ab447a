//! Chain assembly.
//!
//! A [`Chain`] is the ordered list of stages that runs before a controller
//! (route chain) or before every route of a mounted subtree (subroute
//! chain). Order is fixed:
//!
//! ```text
//! pre → authorization → schema validation → middleware → file upload
//! ```

use std::fmt;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::{from_fn, Next};
use axum::routing::MethodRouter;
use axum::Router;

use crate::error::ComposeError;
use crate::http::middleware::authorization::{self, AuthObjectHandler, Authorizer};
use crate::http::middleware::managed::managed_all;
use crate::http::middleware::validation::{
    self, default_error_response, RuleValidator, SchemaValidator, ValidationErrorHandler,
};
use crate::http::middleware::{upload, Middleware, Stage, StageKind};
use crate::tree::schema::ValidationSchema;

/// Declaration fields a chain is built from.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageConfig<'a> {
    pub validation_schema: Option<&'a ValidationSchema>,
    pub authorizer: Option<&'a Authorizer>,
    pub middleware: &'a [Middleware],
    pub pre: &'a [Middleware],
}

/// Ordered stages, outermost first.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    stages: Vec<Stage>,
}

impl Chain {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stage> {
        self.stages.iter()
    }

    pub fn kinds(&self) -> Vec<StageKind> {
        self.stages.iter().map(Stage::kind).collect()
    }

    /// Layer the chain onto a single route.
    pub(crate) fn wrap_method_router(&self, mut method_router: MethodRouter) -> MethodRouter {
        for stage in self.stages.iter().rev() {
            let run = stage.runner();
            method_router = method_router.layer(from_fn(move |req: Request, next: Next| run(req, next)));
        }
        method_router
    }

    /// Layer the chain onto every route of a subtree.
    pub(crate) fn wrap_router(&self, mut router: Router) -> Router {
        for stage in self.stages.iter().rev() {
            let run = stage.runner();
            router = router.layer(from_fn(move |req: Request, next: Next| run(req, next)));
        }
        router
    }
}

/// Builds chains with the application's resolver and validator.
#[derive(Clone)]
pub struct ChainBuilder {
    auth_object_handler: Option<AuthObjectHandler>,
    validator: Arc<dyn SchemaValidator>,
    on_validation_error: ValidationErrorHandler,
}

impl Default for ChainBuilder {
    fn default() -> Self {
        Self {
            auth_object_handler: None,
            validator: Arc::new(RuleValidator),
            on_validation_error: Arc::new(default_error_response),
        }
    }
}

impl ChainBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auth_object_handler(mut self, handler: AuthObjectHandler) -> Self {
        self.auth_object_handler = Some(handler);
        self
    }

    pub fn validator(mut self, validator: impl SchemaValidator) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    pub fn validation_error_handler(mut self, handler: ValidationErrorHandler) -> Self {
        self.on_validation_error = handler;
        self
    }

    pub fn has_auth_object_handler(&self) -> bool {
        self.auth_object_handler.is_some()
    }

    /// Assemble the stages for one declaration.
    ///
    /// Fails when an authorizer is declared but no resolver is configured.
    pub fn build(&self, config: StageConfig<'_>) -> Result<Chain, ComposeError> {
        let mut stages: Vec<Stage> = managed_all(StageKind::Pre, config.pre).collect();

        stages.extend(authorization::stage(
            config.authorizer,
            self.auth_object_handler.as_ref(),
        )?);
        stages.extend(validation::stage(
            config.validation_schema,
            &self.validator,
            &self.on_validation_error,
        ));
        stages.extend(managed_all(StageKind::Middleware, config.middleware));
        stages.extend(upload::stage(
            config.validation_schema.and_then(|s| s.file_upload.as_ref()),
            &self.on_validation_error,
        ));

        Ok(Chain { stages })
    }
}

impl fmt::Debug for ChainBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainBuilder")
            .field("auth_object_handler", &self.auth_object_handler.is_some())
            .finish_non_exhaustive()
    }
}
