//! Authorization stage.
//!
//! The application configures one resolver ([`AuthObjectHandler`]) that turns
//! a request into an [`AuthObject`]. Routes carry an [`Authorizer`] naming the
//! permissions they accept; the stage resolves the principal, checks it and
//! attaches it to the request for downstream stages and the controller.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ComposeError, HandlerError};
use crate::http::middleware::{Stage, StageKind};
use crate::http::response;

/// Permissions accepted by a route; empty accepts any resolved principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Authorizer(pub Vec<String>);

impl Authorizer {
    /// Accept any principal the resolver produces.
    pub fn authenticated() -> Self {
        Self::default()
    }

    /// Accept principals holding at least one of `permissions`.
    pub fn any_of<I, S>(permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(permissions.into_iter().map(Into::into).collect())
    }

    pub fn permits(&self, principal: &AuthObject) -> bool {
        self.0.is_empty() || self.0.iter().any(|p| principal.permissions.contains(p))
    }
}

/// Principal produced by the resolver.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthObject {
    pub subject: Option<String>,
    pub permissions: BTreeSet<String>,
    #[serde(default)]
    pub claims: Value,
}

impl AuthObject {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Self::default()
        }
    }

    pub fn with_permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }
}

type ResolveFn = dyn Fn(&Parts) -> BoxFuture<'static, Result<AuthObject, HandlerError>> + Send + Sync;

/// Resolves the principal of a request.
#[derive(Clone)]
pub struct AuthObjectHandler(Arc<ResolveFn>);

impl AuthObjectHandler {
    /// The returned future must not borrow from the request parts; copy what
    /// it needs before the `async` block.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(&Parts) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AuthObject, HandlerError>> + Send + 'static,
    {
        Self(Arc::new(move |parts| f(parts).boxed()))
    }

    pub async fn resolve(&self, parts: &Parts) -> Result<AuthObject, HandlerError> {
        (self.0)(parts).await
    }
}

impl fmt::Debug for AuthObjectHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthObjectHandler")
    }
}

/// Build the authorization stage for `authorizer`, if one is declared.
///
/// Declaring an authorizer without a resolver is a composition error.
pub(crate) fn stage(
    authorizer: Option<&Authorizer>,
    handler: Option<&AuthObjectHandler>,
) -> Result<Option<Stage>, ComposeError> {
    let Some(authorizer) = authorizer else {
        return Ok(None);
    };
    let Some(handler) = handler else {
        return Err(ComposeError::MissingAuthObjectHandler);
    };

    let authorizer = authorizer.clone();
    let handler = handler.clone();
    Ok(Some(Stage::new(StageKind::Authorization, move |req: Request, next| {
        let authorizer = authorizer.clone();
        let handler = handler.clone();
        async move {
            let (mut parts, body) = req.into_parts();

            let principal = match handler.resolve(&parts).await {
                Ok(principal) => principal,
                Err(HandlerError::Http { status, message }) => {
                    return response::message(status, &message);
                }
                Err(err) => {
                    tracing::debug!(path = %parts.uri.path(), error = %err, "Authorization rejected");
                    return response::message(StatusCode::UNAUTHORIZED, "Unauthorized");
                }
            };

            if !authorizer.permits(&principal) {
                tracing::debug!(
                    path = %parts.uri.path(),
                    subject = ?principal.subject,
                    required = ?authorizer.0,
                    "Principal lacks required permission"
                );
                return response::message(StatusCode::FORBIDDEN, "Forbidden");
            }

            parts.extensions.insert(principal);
            next.run(Request::from_parts(parts, body)).await
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permits() {
        let admin = AuthObject::new("alice").with_permission("admin");
        assert!(Authorizer::authenticated().permits(&admin));
        assert!(Authorizer::any_of(["admin", "ops"]).permits(&admin));
        assert!(!Authorizer::any_of(["ops"]).permits(&admin));
    }

    #[test]
    fn test_missing_handler_is_compose_error() {
        let err = stage(Some(&Authorizer::any_of(["hehe"])), None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'authorizer' object declared, but 'authObjectHandler' is not defined in ExpressApp constructor params, or is an empty function"
        );
    }

    #[test]
    fn test_no_authorizer_no_stage() {
        let handler = AuthObjectHandler::new(|_parts: &Parts| async { Ok(AuthObject::default()) });
        assert!(stage(None, Some(&handler)).unwrap().is_none());
        assert!(stage(None, None).unwrap().is_none());
    }

    #[test]
    fn test_authorizer_deserializes_from_list() {
        let authorizer: Authorizer = serde_json::from_str(r#"["admin"]"#).unwrap();
        assert_eq!(authorizer, Authorizer::any_of(["admin"]));
    }
}
