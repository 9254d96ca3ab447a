//! Error types shared across composition and dispatch.
//!
//! # Taxonomy
//! - [`ComposeError`]: startup-time, raised while compiling a route tree.
//!   The application must not start when one is returned.
//! - [`HandlerError`]: request-time, raised by controllers, middleware and
//!   resolvers. Recovered by a route error handler or rendered by the
//!   application error pipeline.

use axum::http::StatusCode;
use thiserror::Error;

/// Boxed error accepted from application code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result returned by controllers and response helpers.
pub type HandlerResult = Result<(), HandlerError>;

/// Failure while compiling a route tree into a router.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// Two or more routes share a `(verb, normalized path)` pair.
    #[error("Duplicate endpoints detected! -> {}", .0.join(", "))]
    DuplicateEndpoints(Vec<String>),

    /// An `authorizer` was declared without a resolver to produce the auth object.
    #[error("'authorizer' object declared, but 'authObjectHandler' is not defined in ExpressApp constructor params, or is an empty function")]
    MissingAuthObjectHandler,

    /// Two templates disagree on the parameter name at the same position.
    #[error("conflicting path parameters: '{first}' and '{second}' capture the same segment under different names")]
    ConflictingParameters { first: String, second: String },

    /// A path template could not be translated for the router.
    #[error("invalid path template '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

/// Failure raised while handling a request.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A controller kept the default `handle_request`.
    #[error("'handleRequest' not implemented in {0}")]
    NotImplemented(String),

    /// A response helper was called after a response had already been produced.
    #[error("a response has already been sent for this request")]
    AlreadyResponded,

    /// The request body could not be read.
    #[error("failed to read request body: {0}")]
    Body(#[from] axum::Error),

    /// The request body was not valid for its declared content type.
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// A controller panicked while handling the request.
    #[error("controller panicked: {0}")]
    Panicked(String),

    /// An error carrying an explicit HTTP status.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// Any other application error.
    #[error(transparent)]
    Other(BoxError),
}

impl HandlerError {
    /// Wrap an arbitrary application error.
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }

    /// Build an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Other(message.into().into())
    }

    /// Build an error carrying an explicit status.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Status code used when this error reaches the error pipeline.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedBody(_) | Self::Body(_) => StatusCode::BAD_REQUEST,
            Self::Http { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedBody(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message_format() {
        let err = ComposeError::DuplicateEndpoints(vec![
            "get /hello".to_string(),
            "get /v1/hey".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Duplicate endpoints detected! -> get /hello, get /v1/hey"
        );
    }

    #[test]
    fn test_not_implemented_message() {
        let err = HandlerError::NotImplemented("SomeController".into());
        assert_eq!(err.to_string(), "'handleRequest' not implemented in SomeController");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(HandlerError::msg("boom").status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            HandlerError::MalformedBody("eof".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HandlerError::http(StatusCode::NOT_FOUND, "missing").status(),
            StatusCode::NOT_FOUND
        );
    }
}
