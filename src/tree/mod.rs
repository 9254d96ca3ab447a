//! Declarative route tree.
//!
//! # Data Flow
//! ```text
//! Application declarations (startup)
//!     → method.rs / schema.rs (verbs, validation rules)
//!     → route.rs (Route, Subroute)
//!     → RouterTree (routes + nested subroutes)
//!     → routing::compose (compiled into an axum Router)
//! ```
//!
//! # Design Decisions
//! - The tree is plain data owned by the application; compilation borrows it
//! - Declarations are ordered; order is preserved through compilation
//! - `routes_info` gives a serializable, flattened view of the endpoints

pub mod method;
pub mod route;
pub mod schema;

use serde::Serialize;

use crate::routing::path;

pub use method::Method;
pub use route::{Route, RouteDoc, Subroute};
pub use schema::{FieldKind, FieldRule, FileUploadRule, ValidationOptions, ValidationSchema};

/// A node of the route tree: endpoints plus nested subtrees.
#[derive(Clone, Debug, Default)]
pub struct RouterTree {
    pub routes: Vec<Route>,
    pub subroutes: Vec<Subroute>,
}

/// Flattened view of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteInfo {
    pub method: Method,
    /// Fully qualified, normalized path.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doc: Option<RouteDoc>,
}

impl RouterTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    pub fn subroute(mut self, subroute: Subroute) -> Self {
        self.subroutes.push(subroute);
        self
    }

    /// Depth-first walk over every route, with its mount prefix.
    ///
    /// A node's own routes are visited before its subroutes.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&str, &'a Route)) {
        self.walk_from("", visit);
    }

    fn walk_from<'a>(&'a self, prefix: &str, visit: &mut impl FnMut(&str, &'a Route)) {
        for route in &self.routes {
            visit(prefix, route);
        }
        for sub in &self.subroutes {
            let nested = path::join(prefix, &sub.path);
            sub.router.walk_from(&nested, visit);
        }
    }

    /// Every endpoint with its fully qualified path, in traversal order.
    pub fn routes_info(&self) -> Vec<RouteInfo> {
        let mut out = Vec::new();
        self.walk(&mut |prefix, route| {
            out.push(RouteInfo {
                method: route.method,
                path: path::normalize(&path::join(prefix, &route.path)),
                doc: route.doc.clone(),
            });
        });
        out
    }

    /// Number of endpoints in the fully flattened tree.
    pub fn route_count(&self) -> usize {
        self.routes.len()
            + self
                .subroutes
                .iter()
                .map(|s| s.router.route_count())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerKind;

    fn noop() -> ControllerKind {
        ControllerKind::function(|_req| async { "ok" })
    }

    #[test]
    fn test_routes_info_flattens_in_order() {
        let tree = RouterTree::new()
            .route(Route::get("/", noop()))
            .subroute(Subroute::new(
                "/users",
                RouterTree::new()
                    .route(Route::get("/", noop()))
                    .route(Route::post("/", noop()))
                    .subroute(Subroute::new(
                        "/:userId/posts",
                        RouterTree::new().route(Route::get("/", noop())),
                    )),
            ));

        let info: Vec<(Method, String)> = tree
            .routes_info()
            .into_iter()
            .map(|r| (r.method, r.path))
            .collect();
        assert_eq!(
            info,
            vec![
                (Method::Get, "/".to_string()),
                (Method::Get, "/users".to_string()),
                (Method::Post, "/users".to_string()),
                (Method::Get, "/users/:userId/posts".to_string()),
            ]
        );
        assert_eq!(tree.route_count(), 4);
    }

    #[test]
    fn test_routes_info_serializes_docs() {
        let tree = RouterTree::new()
            .route(Route::get("/hello", noop()).with_doc(serde_json::json!({ "tags": ["greeting"] })));
        let json = serde_json::to_value(tree.routes_info()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "method": "get", "path": "/hello", "doc": { "tags": ["greeting"] } }])
        );
    }
}
