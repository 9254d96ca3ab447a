//! Path template handling.
//!
//! Templates are declared express-style (`/users/:userId`, `/files/*rest`).
//! Normalization collapses duplicate slashes and strips a single trailing
//! slash, so `/hello` and `/hello/` name the same endpoint.

use crate::error::ComposeError;

/// One segment of a path template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Param(&'a str),
    Wildcard(&'a str),
}

/// Concatenate a mount prefix and a path, collapsing duplicate slashes.
pub fn join(prefix: &str, path: &str) -> String {
    collapse_slashes(&format!("{prefix}/{path}"))
}

/// Normalize a full path: collapse duplicate slashes, trim one trailing slash.
pub fn normalize(path: &str) -> String {
    let mut collapsed = collapse_slashes(path);
    if collapsed.len() > 1 && collapsed.ends_with('/') {
        collapsed.pop();
    }
    if collapsed.is_empty() {
        collapsed.push('/');
    }
    collapsed
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        if ch == '/' && out.ends_with('/') {
            continue;
        }
        out.push(ch);
    }
    out
}

/// Split a normalized path into its segments. The root path has none.
pub fn segments(path: &str) -> impl Iterator<Item = Segment<'_>> {
    path.split('/').filter(|s| !s.is_empty()).map(|s| {
        if let Some(name) = s.strip_prefix(':') {
            Segment::Param(name)
        } else if let Some(name) = s.strip_prefix('*') {
            Segment::Wildcard(name)
        } else {
            Segment::Literal(s)
        }
    })
}

/// Translate an express-style template into axum route syntax.
///
/// `/users/:id` becomes `/users/{id}` and `/files/*rest` becomes
/// `/files/{*rest}`; a bare `*` captures into `wildcard`.
pub fn to_axum(template: &str) -> Result<String, ComposeError> {
    let invalid = |reason| ComposeError::InvalidPath {
        path: template.to_string(),
        reason,
    };

    if !template.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }

    let normalized = normalize(template);
    let parts: Vec<Segment<'_>> = segments(&normalized).collect();
    if parts.is_empty() {
        return Ok("/".to_string());
    }

    let mut out = String::with_capacity(normalized.len() + 4);
    for (i, segment) in parts.iter().enumerate() {
        out.push('/');
        match segment {
            Segment::Literal(lit) => {
                if lit.contains(['{', '}']) {
                    return Err(invalid("braces are not allowed in literal segments"));
                }
                out.push_str(lit);
            }
            Segment::Param(name) => {
                if !is_valid_name(name) {
                    return Err(invalid("parameter names must be non-empty alphanumerics"));
                }
                out.push('{');
                out.push_str(name);
                out.push('}');
            }
            Segment::Wildcard(name) => {
                if i + 1 != parts.len() {
                    return Err(invalid("a wildcard must be the final segment"));
                }
                let name = if name.is_empty() { "wildcard" } else { name };
                if !is_valid_name(name) {
                    return Err(invalid("parameter names must be non-empty alphanumerics"));
                }
                out.push_str("{*");
                out.push_str(name);
                out.push('}');
            }
        }
    }
    Ok(out)
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
