//! Route tree compilation.
//!
//! # Responsibilities
//! - Reject trees with duplicate or conflicting endpoints before registering anything
//! - Build each route's chain and terminate it with the controller dispatcher
//! - Compile subtrees recursively and mount them behind their link's chain
//!
//! # Design Decisions
//! - Compilation is all-or-nothing: the router is only returned once every
//!   route and mount succeeded
//! - Mount prefixes are threaded through the recursion, never global
//! - `all` routes become the method router's fallback, so they coexist with
//!   verb routes on the same path

use axum::extract::Request;
use axum::routing::{on, MethodRouter};
use axum::Router;

use crate::controller::Dispatcher;
use crate::error::ComposeError;
use crate::http::middleware::{ChainBuilder, StageConfig, StageKind};
use crate::routing::duplicates;
use crate::routing::path::{self, Segment};
use crate::tree::{Method, Route, RouterTree, Subroute};

/// One registered endpoint and the stages in front of its controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub method: Method,
    /// Fully qualified, normalized, express-style path.
    pub path: String,
    /// Stage kinds in execution order, mount chains first, ending with the controller.
    pub stages: Vec<StageKind>,
}

/// Output of a successful compilation.
#[derive(Debug)]
pub struct CompiledRouter {
    pub router: Router,
    pub registrations: Vec<Registration>,
}

impl CompiledRouter {
    pub fn route_count(&self) -> usize {
        self.registrations.len()
    }
}

/// Compiles route trees with one chain configuration.
#[derive(Debug, Clone, Default)]
pub struct RouterFactory {
    chains: ChainBuilder,
}

impl RouterFactory {
    pub fn new(chains: ChainBuilder) -> Self {
        Self { chains }
    }

    pub fn chains(&self) -> &ChainBuilder {
        &self.chains
    }

    /// Compile `tree` into a router.
    ///
    /// Duplicate detection covers the whole tree, so a subtree is never
    /// checked again on its own.
    pub fn compile(&self, tree: &RouterTree) -> Result<CompiledRouter, ComposeError> {
        duplicates::ensure_unique(tree)?;
        duplicates::ensure_consistent_params(tree)?;

        let mut registrations = Vec::with_capacity(tree.route_count());
        let router = self.compile_node(tree, "", &[], &mut registrations)?;

        tracing::info!(routes = registrations.len(), "Route tree compiled");
        Ok(CompiledRouter { router, registrations })
    }

    fn compile_node(
        &self,
        tree: &RouterTree,
        prefix: &str,
        outer: &[StageKind],
        registrations: &mut Vec<Registration>,
    ) -> Result<Router, ComposeError> {
        let mut router = Router::new();
        for route in &tree.routes {
            let template = path::to_axum(&route.path)?;
            let (method_router, chain_kinds) = self.compile_route(route)?;

            let full = path::normalize(&path::join(prefix, &route.path));
            tracing::debug!(method = %route.method, path = %full, controller = route.controller.name(), "Registered route");
            registrations.push(Registration {
                method: route.method,
                path: full,
                stages: outer.iter().copied().chain(chain_kinds).chain([StageKind::Controller]).collect(),
            });

            router = router.route(&template, method_router);
        }

        for subroute in &tree.subroutes {
            router = self.mount(router, subroute, prefix, outer, registrations)?;
        }
        Ok(router)
    }

    fn compile_route(&self, route: &Route) -> Result<(MethodRouter, Vec<StageKind>), ComposeError> {
        let chain = self.chains.build(StageConfig {
            validation_schema: route.validation_schema.as_ref(),
            authorizer: route.authorizer.as_ref(),
            middleware: &route.middleware,
            pre: &route.pre,
        })?;

        let dispatcher = Dispatcher::new(route.controller.clone(), route.error_handler.clone());
        let handler = move |req: Request| {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.dispatch(req).await }
        };

        let method_router = match route.method.filter() {
            Some(filter) => on(filter, handler),
            None => MethodRouter::new().fallback(handler),
        };
        Ok((chain.wrap_method_router(method_router), chain.kinds()))
    }

    fn mount(
        &self,
        router: Router,
        subroute: &Subroute,
        prefix: &str,
        outer: &[StageKind],
        registrations: &mut Vec<Registration>,
    ) -> Result<Router, ComposeError> {
        let mount_path = path::normalize(&subroute.path);
        if path::segments(&mount_path).any(|s| matches!(s, Segment::Wildcard(_))) {
            return Err(ComposeError::InvalidPath {
                path: subroute.path.clone(),
                reason: "a mount path cannot contain a wildcard",
            });
        }
        let template = path::to_axum(&subroute.path)?;

        let chain = self.chains.build(StageConfig {
            validation_schema: subroute.validation_schema.as_ref(),
            authorizer: subroute.authorizer.as_ref(),
            middleware: &subroute.middleware,
            pre: &subroute.pre,
        })?;

        let mut nested_outer = outer.to_vec();
        nested_outer.extend(chain.kinds());
        let child = self.compile_node(
            &subroute.router,
            &path::join(prefix, &subroute.path),
            &nested_outer,
            registrations,
        )?;
        let child = chain.wrap_router(child);

        tracing::debug!(path = %mount_path, stages = chain.len(), "Mounted subtree");
        Ok(if template == "/" {
            router.merge(child)
        } else {
            router.nest(&template, child)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerKind;
    use crate::http::middleware::Middleware;
    use crate::tree::{FieldRule, ValidationSchema};
    use axum::middleware::Next;

    fn noop() -> ControllerKind {
        ControllerKind::function(|_req: Request| async { "ok" })
    }

    fn passthrough() -> Middleware {
        Middleware::new(|req: Request, next: Next| async move { Ok(next.run(req).await) })
    }

    #[test]
    fn test_same_path_different_verbs_compiles() {
        let tree = RouterTree::new()
            .route(Route::get("/hello", noop()))
            .route(Route::post("/hello", noop()));
        let compiled = RouterFactory::default().compile(&tree).unwrap();
        assert_eq!(compiled.route_count(), 2);
    }

    #[test]
    fn test_trailing_slash_duplicate_rejected() {
        let tree = RouterTree::new()
            .route(Route::get("/hello", noop()))
            .route(Route::get("/hello/", noop()));
        let err = RouterFactory::default().compile(&tree).unwrap_err();
        assert_eq!(err.to_string(), "Duplicate endpoints detected! -> get /hello");
    }

    #[test]
    fn test_registers_flattened_route_count() {
        let tree = RouterTree::new()
            .route(Route::get("/", noop()))
            .subroute(Subroute::new(
                "/users",
                RouterTree::new()
                    .route(Route::get("/", noop()))
                    .route(Route::all("/", noop()))
                    .subroute(Subroute::new(
                        "/:userId/posts",
                        RouterTree::new().route(Route::get("/:postId", noop())),
                    )),
            ))
            .subroute(Subroute::new("/", RouterTree::new().route(Route::get("/health", noop()))));

        let compiled = RouterFactory::default().compile(&tree).unwrap();
        assert_eq!(compiled.route_count(), tree.route_count());
        let paths: Vec<&str> = compiled.registrations.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/", "/users", "/users", "/users/:userId/posts/:postId", "/health"]
        );
    }

    #[test]
    fn test_registration_lists_mount_stages_first() {
        let tree = RouterTree::new().subroute(
            Subroute::new(
                "/v1",
                RouterTree::new().route(
                    Route::post("/users", noop())
                        .with_schema(ValidationSchema::new().body("name", FieldRule::string().required()))
                        .with_middleware(passthrough()),
                ),
            )
            .with_pre(passthrough()),
        );

        let compiled = RouterFactory::default().compile(&tree).unwrap();
        assert_eq!(
            compiled.registrations[0].stages,
            vec![
                StageKind::Pre,
                StageKind::SchemaValidation,
                StageKind::Middleware,
                StageKind::Controller,
            ]
        );
    }

    #[test]
    fn test_wildcard_mount_rejected() {
        let tree = RouterTree::new().subroute(Subroute::new("/files/*rest", RouterTree::new()));
        let err = RouterFactory::default().compile(&tree).unwrap_err();
        assert!(matches!(err, ComposeError::InvalidPath { .. }));
    }

    #[test]
    fn test_conflicting_param_names_rejected() {
        let tree = RouterTree::new()
            .route(Route::get("/users/:id", noop()))
            .route(Route::delete("/users/:userId", noop()));
        let err = RouterFactory::default().compile(&tree).unwrap_err();
        assert!(matches!(err, ComposeError::ConflictingParameters { .. }));
    }

    #[test]
    fn test_param_and_wildcard_siblings_rejected() {
        let tree = RouterTree::new()
            .route(Route::get("/a/:id", noop()))
            .route(Route::get("/a/*rest", noop()));
        let err = RouterFactory::default().compile(&tree).unwrap_err();
        assert!(matches!(err, ComposeError::ConflictingParameters { .. }));
    }

    #[test]
    fn test_wildcard_route_beside_param_mount_rejected() {
        let tree = RouterTree::new()
            .route(Route::get("/files/*rest", noop()))
            .subroute(Subroute::new(
                "/files/:id",
                RouterTree::new().route(Route::get("/", noop())),
            ));
        let err = RouterFactory::default().compile(&tree).unwrap_err();
        assert!(matches!(err, ComposeError::ConflictingParameters { .. }));
    }
}
