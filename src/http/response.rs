//! Response construction.
//!
//! # Responsibilities
//! - Build JSON and status-only responses used by the controller vocabulary
//! - Carry errors forwarded to the application error pipeline
//!
//! # Design Decisions
//! - Client and server errors use a `{ "message": ... }` body
//! - A forwarded error travels as a response extension so the outermost
//!   pipeline stage can render it; without a pipeline the placeholder
//!   response is still a valid answer

use std::sync::Arc;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

use crate::error::HandlerError;

/// Error handed to the generic error pipeline.
#[derive(Clone, Debug)]
pub struct ForwardedError(pub Arc<HandlerError>);

/// `status` with a JSON body.
pub fn json(status: StatusCode, body: Value) -> Response {
    (status, Json(body)).into_response()
}

/// `status` with no body.
pub fn status_only(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    response
}

/// `status` with `{ "message": message }`.
pub fn message(status: StatusCode, message: &str) -> Response {
    json(status, json!({ "message": message }))
}

/// `status` with `{ "message": message, ...extra }`.
///
/// Only object fields of `extra` are merged; `message` always wins.
pub fn message_with(status: StatusCode, message: &str, extra: Option<Value>) -> Response {
    let mut body = Map::new();
    if let Some(Value::Object(fields)) = extra {
        body.extend(fields);
    }
    body.insert("message".to_string(), Value::String(message.to_string()));
    json(status, Value::Object(body))
}

/// Placeholder response carrying `err` to the error pipeline.
pub fn forward_error(err: HandlerError) -> Response {
    let status = err.status();
    let text = if status.is_server_error() {
        "Internal server error".to_string()
    } else {
        err.to_string()
    };
    let mut response = message(status, &text);
    response.extensions_mut().insert(ForwardedError(Arc::new(err)));
    response
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        forward_error(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_message_with_merges_extra() {
        let response = message_with(
            StatusCode::INTERNAL_SERVER_ERROR,
            "some message",
            Some(json!({ "some": "data", "message": "ignored" })),
        );
        assert_eq!(
            body_json(response).await,
            json!({ "message": "some message", "some": "data" })
        );
    }

    #[tokio::test]
    async fn test_forward_error_hides_server_details() {
        let response = forward_error(HandlerError::msg("db password leaked"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<ForwardedError>().is_some());
        assert_eq!(body_json(response).await, json!({ "message": "Internal server error" }));
    }

    #[tokio::test]
    async fn test_forward_error_keeps_client_message() {
        let response = forward_error(HandlerError::http(StatusCode::NOT_FOUND, "Could not find user"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await, json!({ "message": "Could not find user" }));
    }
}
