//! Duplicate endpoint detection.
//!
//! # Responsibilities
//! - Flatten the tree into `(verb, normalized path)` keys
//! - Report every key seen more than once, in first-seen order
//! - Reject templates the router cannot hold side by side
//!
//! # Design Decisions
//! - Runs over the whole tree before anything is registered (fail fast)
//! - Trailing slashes are insignificant: `/hello` and `/hello/` collide
//! - Parameter names are significant for duplicates, but two different
//!   captures at the same position of the same prefix are a conflict for
//!   the router

use std::collections::HashMap;

use crate::error::ComposeError;
use crate::routing::path::{self, Segment};
use crate::tree::{Method, RouterTree};

/// Collisions in the tree, formatted as `"<verb> <path>"`, first-seen order.
pub fn detect(tree: &RouterTree) -> Vec<String> {
    let mut order: Vec<(Method, String)> = Vec::new();
    let mut counts: HashMap<(Method, String), usize> = HashMap::new();

    tree.walk(&mut |prefix, route| {
        let key = (route.method, path::normalize(&path::join(prefix, &route.path)));
        let count = counts.entry(key.clone()).or_insert(0);
        if *count == 0 {
            order.push(key);
        }
        *count += 1;
    });

    order
        .into_iter()
        .filter(|key| counts.get(key).copied().unwrap_or(0) > 1)
        .map(|(method, path)| format!("{method} {path}"))
        .collect()
}

/// Fail with [`ComposeError::DuplicateEndpoints`] if the tree has collisions.
pub fn ensure_unique(tree: &RouterTree) -> Result<(), ComposeError> {
    let duplicates = detect(tree);
    if duplicates.is_empty() {
        Ok(())
    } else {
        tracing::error!(duplicates = ?duplicates, "Duplicate endpoints in route tree");
        Err(ComposeError::DuplicateEndpoints(duplicates))
    }
}

/// Fail if two templates capture the same segment differently.
///
/// `/users/:id` and `/users/:userId/posts` cannot share a router: the
/// segment after `/users` must have one name. A parameter and a wildcard at
/// the same position conflict as well. Mount prefixes are checked even when
/// their subtree registers nothing at the prefix itself.
pub fn ensure_consistent_params(tree: &RouterTree) -> Result<(), ComposeError> {
    // shape prefix (captures erased) -> (capture, template that introduced it)
    let mut seen: HashMap<String, (Capture, String)> = HashMap::new();
    let mut templates = Vec::new();
    collect_templates(tree, "", &mut templates);

    for full in &templates {
        let mut shape = String::new();
        for segment in path::segments(full) {
            shape.push('/');
            let capture = match segment {
                Segment::Literal(lit) => {
                    shape.push_str(lit);
                    continue;
                }
                Segment::Param(name) => Capture::Param(name.to_string()),
                Segment::Wildcard(name) => Capture::Wildcard(name.to_string()),
            };
            shape.push_str("{}");
            match seen.get(&shape) {
                Some((existing, template)) if *existing != capture => {
                    return Err(ComposeError::ConflictingParameters {
                        first: template.clone(),
                        second: full.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    seen.insert(shape.clone(), (capture, full.clone()));
                }
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Capture {
    Param(String),
    Wildcard(String),
}

/// Every route path and mount prefix, fully qualified, in traversal order.
fn collect_templates(tree: &RouterTree, prefix: &str, out: &mut Vec<String>) {
    for route in &tree.routes {
        out.push(path::normalize(&path::join(prefix, &route.path)));
    }
    for sub in &tree.subroutes {
        let nested = path::join(prefix, &sub.path);
        out.push(path::normalize(&nested));
        collect_templates(&sub.router, &nested, out);
    }
}
