//! Per-request controller context.
//!
//! Each dispatch builds a fresh [`RequestContext`]; controllers read the
//! request through it and answer through its response vocabulary. Nothing is
//! stored on the controller, so one instance can serve concurrent requests.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::Response;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tower_http::request_id::RequestId;

use crate::error::{HandlerError, HandlerResult};
use crate::http::middleware::authorization::AuthObject;
use crate::http::request::{RequestData, UploadedFiles};
use crate::http::response;

/// Where the request stands in its lifecycle.
#[derive(Default)]
pub(crate) enum Lifecycle {
    #[default]
    Pending,
    Responded(Response),
    Delegated(HandlerError),
}

/// Request accessors and response helpers for one dispatch.
pub struct RequestContext {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    data: Arc<RequestData>,
    auth: Option<AuthObject>,
    request_id: Option<String>,
    lifecycle: Lifecycle,
}

impl RequestContext {
    /// Build a context from a request, parsing its data if no earlier stage did.
    pub async fn from_request(req: Request) -> Result<Self, HandlerError> {
        let (req, data) = RequestData::load(req).await?;
        let (parts, _body) = req.into_parts();
        Ok(Self {
            auth: parts.extensions.get::<AuthObject>().cloned(),
            request_id: parts
                .extensions
                .get::<RequestId>()
                .and_then(|id| id.header_value().to_str().ok())
                .map(str::to_string),
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            data,
            lifecycle: Lifecycle::Pending,
        })
    }

    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        Self {
            method: Method::GET,
            uri: Uri::from_static("/"),
            headers: HeaderMap::new(),
            data: Arc::default(),
            auth: None,
            request_id: None,
            lifecycle: Lifecycle::Pending,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Principal resolved by the authorization stage, if one ran.
    pub fn auth(&self) -> Option<&AuthObject> {
        self.auth.as_ref()
    }

    /// Combined request data: `{ body?, query?, params?, fileUpload? }`.
    ///
    /// Sections with no content are omitted.
    pub fn data(&self) -> Value {
        let mut out = Map::new();
        if !is_empty(&self.data.body) {
            out.insert("body".into(), self.data.body.clone());
        }
        if !self.data.query.is_empty() {
            out.insert("query".into(), Value::Object(self.data.query.clone()));
        }
        if !self.data.params.is_empty() {
            out.insert("params".into(), Value::Object(self.data.params.clone()));
        }
        if let Some(files) = self.data.file_upload.as_ref().filter(|f| !f.is_empty()) {
            out.insert(
                "fileUpload".into(),
                serde_json::to_value(files).unwrap_or(Value::Null),
            );
        }
        Value::Object(out)
    }

    pub fn body(&self) -> &Value {
        &self.data.body
    }

    pub fn query(&self) -> &Map<String, Value> {
        &self.data.query
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.data.params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.data.params.get(name).and_then(Value::as_str)
    }

    pub fn file_upload(&self) -> Option<&UploadedFiles> {
        self.data.file_upload.as_ref()
    }

    /// Deserialize the body into `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_value(self.data.body.clone())?)
    }

    /// Deserialize the path parameters into `T`.
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, HandlerError> {
        Ok(serde_json::from_value(Value::Object(self.data.params.clone()))?)
    }

    /// Headers as a name to value mapping; repeated headers are joined with `", "`.
    pub fn headers(&self) -> Value {
        let mut out: Map<String, Value> = Map::new();
        for (name, value) in &self.headers {
            let Ok(value) = value.to_str() else { continue };
            match out.get_mut(name.as_str()) {
                Some(Value::String(existing)) => {
                    existing.push_str(", ");
                    existing.push_str(value);
                }
                _ => {
                    out.insert(name.as_str().to_string(), Value::String(value.to_string()));
                }
            }
        }
        Value::Object(out)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn raw_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// `{ "cookies": {...}, "signedCookies": {...} }`.
    pub fn cookies(&self) -> Value {
        serde_json::json!({
            "cookies": self.data.cookies,
            "signedCookies": self.data.signed_cookies,
        })
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.data.cookies.get(name).map(String::as_str)
    }

    pub fn signed_cookie(&self, name: &str) -> Option<&str> {
        self.data.signed_cookies.get(name).map(String::as_str)
    }

    pub fn signed_cookies(&self) -> &BTreeMap<String, String> {
        &self.data.signed_cookies
    }

    /// True once a response has been produced.
    pub fn headers_sent(&self) -> bool {
        matches!(self.lifecycle, Lifecycle::Responded(_))
    }

    /// Hand `err` to the application error pipeline instead of responding.
    pub fn next(&mut self, err: HandlerError) -> HandlerResult {
        self.settle(Lifecycle::Delegated(err))
    }

    /// Send an arbitrary response.
    pub fn send(&mut self, response: Response) -> HandlerResult {
        self.settle(Lifecycle::Responded(response))
    }

    /// Send `status` with a JSON body.
    pub fn json(&mut self, status: StatusCode, body: impl Serialize) -> HandlerResult {
        let body = serde_json::to_value(body).map_err(HandlerError::other)?;
        self.send(response::json(status, body))
    }

    /// Send `status` with no body.
    pub fn send_status(&mut self, status: StatusCode) -> HandlerResult {
        self.send(response::status_only(status))
    }

    /// 200; a `null`/`()` body sends the bare status.
    pub fn ok(&mut self, body: impl Serialize) -> HandlerResult {
        self.success(StatusCode::OK, body)
    }

    /// 201; a `null`/`()` body sends the bare status.
    pub fn created(&mut self, body: impl Serialize) -> HandlerResult {
        self.success(StatusCode::CREATED, body)
    }

    /// 202; a `null`/`()` body sends the bare status.
    pub fn accepted(&mut self, body: impl Serialize) -> HandlerResult {
        self.success(StatusCode::ACCEPTED, body)
    }

    pub fn no_content(&mut self) -> HandlerResult {
        self.send_status(StatusCode::NO_CONTENT)
    }

    pub fn bad_request<'a>(&mut self, message: impl Into<Option<&'a str>>) -> HandlerResult {
        self.client_error(StatusCode::BAD_REQUEST, message.into(), "Bad request")
    }

    pub fn unauthorized<'a>(&mut self, message: impl Into<Option<&'a str>>) -> HandlerResult {
        self.client_error(StatusCode::UNAUTHORIZED, message.into(), "Unauthorized")
    }

    pub fn payment_required<'a>(&mut self, message: impl Into<Option<&'a str>>) -> HandlerResult {
        self.client_error(StatusCode::PAYMENT_REQUIRED, message.into(), "Payment required")
    }

    pub fn forbidden<'a>(&mut self, message: impl Into<Option<&'a str>>) -> HandlerResult {
        self.client_error(StatusCode::FORBIDDEN, message.into(), "Forbidden")
    }

    pub fn not_found<'a>(&mut self, message: impl Into<Option<&'a str>>) -> HandlerResult {
        self.client_error(StatusCode::NOT_FOUND, message.into(), "Not Found")
    }

    pub fn conflict<'a>(&mut self, message: impl Into<Option<&'a str>>) -> HandlerResult {
        self.client_error(StatusCode::CONFLICT, message.into(), "Conflict")
    }

    pub fn too_many<'a>(&mut self, message: impl Into<Option<&'a str>>) -> HandlerResult {
        self.client_error(StatusCode::TOO_MANY_REQUESTS, message.into(), "Too many requests")
    }

    /// 500 with `{ message, ...extra }`.
    pub fn internal_server_error<'a>(
        &mut self,
        message: impl Into<Option<&'a str>>,
        extra: Option<Value>,
    ) -> HandlerResult {
        let message = message.into().unwrap_or("Internal server error");
        self.send(response::message_with(StatusCode::INTERNAL_SERVER_ERROR, message, extra))
    }

    /// 501 with `{ message, ...extra }`.
    pub fn not_implemented<'a>(
        &mut self,
        message: impl Into<Option<&'a str>>,
        extra: Option<Value>,
    ) -> HandlerResult {
        let message = message.into().unwrap_or("Not implemented");
        self.send(response::message_with(StatusCode::NOT_IMPLEMENTED, message, extra))
    }

    /// Only `null` drops the body; `0`, `false` and `""` are sent as JSON.
    fn success(&mut self, status: StatusCode, body: impl Serialize) -> HandlerResult {
        match serde_json::to_value(body).map_err(HandlerError::other)? {
            Value::Null => self.send_status(status),
            body => self.send(response::json(status, body)),
        }
    }

    fn client_error(&mut self, status: StatusCode, message: Option<&str>, default: &str) -> HandlerResult {
        self.send(response::message(status, message.unwrap_or(default)))
    }

    fn settle(&mut self, next: Lifecycle) -> HandlerResult {
        if !matches!(self.lifecycle, Lifecycle::Pending) {
            tracing::warn!(
                method = %self.method,
                path = %self.uri.path(),
                "Response helper called after the request was already settled"
            );
            return Err(HandlerError::AlreadyResponded);
        }
        self.lifecycle = next;
        Ok(())
    }

    pub(crate) fn take_lifecycle(&mut self) -> Lifecycle {
        std::mem::take(&mut self.lifecycle)
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.lifecycle {
            Lifecycle::Pending => "pending",
            Lifecycle::Responded(_) => "responded",
            Lifecycle::Delegated(_) => "delegated",
        };
        f.debug_struct("RequestContext")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("request_id", &self.request_id)
            .field("lifecycle", &state)
            .finish_non_exhaustive()
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::header::{CONTENT_TYPE, COOKIE};
    use serde_json::json;

    async fn settled_json(ctx: &mut RequestContext) -> (StatusCode, Value) {
        let Lifecycle::Responded(response) = ctx.take_lifecycle() else {
            panic!("expected a response");
        };
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_ok_with_and_without_body() {
        let mut ctx = RequestContext::empty();
        ctx.ok(()).unwrap();
        assert_eq!(settled_json(&mut ctx).await, (StatusCode::OK, Value::Null));

        ctx.ok(123).unwrap();
        assert_eq!(settled_json(&mut ctx).await, (StatusCode::OK, json!(123)));
    }

    #[tokio::test]
    async fn test_ok_keeps_falsy_bodies() {
        let mut ctx = RequestContext::empty();
        ctx.ok(0).unwrap();
        assert_eq!(settled_json(&mut ctx).await, (StatusCode::OK, json!(0)));

        ctx.ok(false).unwrap();
        assert_eq!(settled_json(&mut ctx).await, (StatusCode::OK, json!(false)));

        ctx.ok("").unwrap();
        assert_eq!(settled_json(&mut ctx).await, (StatusCode::OK, json!("")));

        ctx.ok(Option::<u8>::None).unwrap();
        assert_eq!(settled_json(&mut ctx).await, (StatusCode::OK, Value::Null));
    }

    #[tokio::test]
    async fn test_created_and_accepted() {
        let mut ctx = RequestContext::empty();
        ctx.created(json!({ "id": 1 })).unwrap();
        assert_eq!(settled_json(&mut ctx).await, (StatusCode::CREATED, json!({ "id": 1 })));

        ctx.accepted(()).unwrap();
        assert_eq!(settled_json(&mut ctx).await, (StatusCode::ACCEPTED, Value::Null));

        ctx.no_content().unwrap();
        assert_eq!(settled_json(&mut ctx).await, (StatusCode::NO_CONTENT, Value::Null));
    }

    #[tokio::test]
    async fn test_client_errors_default_messages() {
        let cases: Vec<(fn(&mut RequestContext) -> HandlerResult, StatusCode, &str)> = vec![
            (|c: &mut RequestContext| c.bad_request(None), StatusCode::BAD_REQUEST, "Bad request"),
            (|c: &mut RequestContext| c.unauthorized(None), StatusCode::UNAUTHORIZED, "Unauthorized"),
            (|c: &mut RequestContext| c.payment_required(None), StatusCode::PAYMENT_REQUIRED, "Payment required"),
            (|c: &mut RequestContext| c.forbidden(None), StatusCode::FORBIDDEN, "Forbidden"),
            (|c: &mut RequestContext| c.not_found(None), StatusCode::NOT_FOUND, "Not Found"),
            (|c: &mut RequestContext| c.conflict(None), StatusCode::CONFLICT, "Conflict"),
            (|c: &mut RequestContext| c.too_many(None), StatusCode::TOO_MANY_REQUESTS, "Too many requests"),
        ];

        for (helper, status, message) in cases {
            let mut ctx = RequestContext::empty();
            helper(&mut ctx).unwrap();
            assert_eq!(settled_json(&mut ctx).await, (status, json!({ "message": message })));
        }
    }

    #[tokio::test]
    async fn test_client_error_custom_message() {
        let mut ctx = RequestContext::empty();
        ctx.not_found("some message").unwrap();
        assert_eq!(
            settled_json(&mut ctx).await,
            (StatusCode::NOT_FOUND, json!({ "message": "some message" }))
        );
    }

    #[tokio::test]
    async fn test_server_errors_merge_extra() {
        let mut ctx = RequestContext::empty();
        ctx.internal_server_error(None, None).unwrap();
        assert_eq!(
            settled_json(&mut ctx).await,
            (StatusCode::INTERNAL_SERVER_ERROR, json!({ "message": "Internal server error" }))
        );

        ctx.internal_server_error("some message", Some(json!({ "some": "data" }))).unwrap();
        assert_eq!(
            settled_json(&mut ctx).await,
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": "some message", "some": "data" })
            )
        );

        ctx.not_implemented(None, None).unwrap();
        assert_eq!(
            settled_json(&mut ctx).await,
            (StatusCode::NOT_IMPLEMENTED, json!({ "message": "Not implemented" }))
        );
    }

    #[tokio::test]
    async fn test_second_response_is_rejected() {
        let mut ctx = RequestContext::empty();
        ctx.ok(json!({ "first": true })).unwrap();
        assert!(matches!(ctx.forbidden(None), Err(HandlerError::AlreadyResponded)));
        assert!(ctx.headers_sent());
        assert_eq!(
            settled_json(&mut ctx).await,
            (StatusCode::OK, json!({ "first": true }))
        );
    }

    #[tokio::test]
    async fn test_accessors_project_request() {
        let req = Request::builder()
            .method("POST")
            .uri("/users?age=2")
            .header(CONTENT_TYPE, "application/json")
            .header(COOKIE, "name=john")
            .header("X-Trace", "abc")
            .body(Body::from(r#"{"name":"john"}"#))
            .unwrap();

        let ctx = RequestContext::from_request(req).await.unwrap();
        assert_eq!(
            ctx.data(),
            json!({ "body": { "name": "john" }, "query": { "age": "2" } })
        );
        assert_eq!(ctx.headers()["x-trace"], json!("abc"));
        assert_eq!(
            ctx.cookies(),
            json!({ "cookies": { "name": "john" }, "signedCookies": {} })
        );
        assert_eq!(ctx.path(), "/users");
    }

    #[tokio::test]
    async fn test_data_is_empty_object_without_input() {
        let ctx = RequestContext::empty();
        assert_eq!(ctx.data(), json!({}));
    }
}
