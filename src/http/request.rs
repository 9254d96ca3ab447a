//! Request handling and projection.
//!
//! # Responsibilities
//! - Generate a unique request ID (UUID v4) when the client sent none
//! - Buffer the request body so every stage can read it again
//! - Project body, query, path params, cookies and upload metadata into
//!   [`RequestData`]
//!
//! # Design Decisions
//! - The body is buffered on first read and put back, so later stages and
//!   the controller see the same bytes
//! - Projections are not cached: a `pre` stage may rewrite the request and
//!   every later stage must see the rewrite
//! - Path parameters include those captured by ancestor mounts
//! - Upload parsing is external: a transport-level parser inserts
//!   [`UploadedFiles`] into the request extensions

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{FromRequestParts, RawPathParams, Request};
use axum::http::header::{CONTENT_TYPE, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tower_http::request_id::{MakeRequestId, RequestId};
use uuid::Uuid;

use crate::error::HandlerError;

/// Default header carrying the request ID.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Generates UUID v4 request IDs.
#[derive(Clone, Copy, Debug, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        Uuid::new_v4().to_string().parse().ok().map(RequestId::new)
    }
}

/// Metadata for one uploaded file, as produced by an upload parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    pub size: u64,
}

/// Files parsed from the current request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadedFiles(pub Vec<UploadedFile>);

impl UploadedFiles {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UploadedFile> {
        self.0.iter()
    }
}

/// Cookies whose signatures were verified by an upstream cookie parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedCookies(pub BTreeMap<String, String>);

/// Parsed view of the incoming request, shared by validation and controllers.
#[derive(Debug, Clone, Default)]
pub struct RequestData {
    pub body: Value,
    pub query: Map<String, Value>,
    pub params: Map<String, Value>,
    pub cookies: BTreeMap<String, String>,
    pub signed_cookies: BTreeMap<String, String>,
    pub file_upload: Option<UploadedFiles>,
}

impl RequestData {
    /// Project the request as it stands now.
    ///
    /// The body is buffered and put back, so a later stage can take the
    /// projection again and sees any rewrite made in between (URI, headers,
    /// body, upload metadata).
    pub async fn load(req: Request) -> Result<(Request, Arc<RequestData>), HandlerError> {
        let (mut parts, body) = req.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await?;

        let data = Arc::new(Self::from_parts(&mut parts, &bytes).await?);
        Ok((Request::from_parts(parts, Body::from(bytes)), data))
    }

    async fn from_parts(parts: &mut Parts, bytes: &Bytes) -> Result<Self, HandlerError> {
        let params = match RawPathParams::from_request_parts(parts, &()).await {
            Ok(raw) => raw
                .iter()
                .filter(|(key, _)| !key.starts_with("__private__"))
                .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
                .collect(),
            Err(_) => Map::new(),
        };

        Ok(Self {
            body: parse_body(&parts.headers, bytes)?,
            query: parse_query(parts.uri.query().unwrap_or_default()),
            params,
            cookies: parse_cookies(&parts.headers),
            signed_cookies: parts
                .extensions
                .get::<SignedCookies>()
                .map(|c| c.0.clone())
                .unwrap_or_default(),
            file_upload: parts.extensions.get::<UploadedFiles>().cloned(),
        })
    }
}

fn parse_body(headers: &HeaderMap, bytes: &Bytes) -> Result<Value, HandlerError> {
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") || content_type.contains("+json") {
        Ok(serde_json::from_slice(bytes)?)
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| HandlerError::MalformedBody(e.to_string()))?;
        Ok(Value::Object(parse_query(text)))
    } else {
        Ok(Value::Null)
    }
}

/// Parse a query string; repeated keys collect into an array.
pub(crate) fn parse_query(query: &str) -> Map<String, Value> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
    let mut out = Map::new();
    for (key, value) in pairs {
        match out.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                out.insert(key, Value::String(value));
            }
        }
    }
    out
}

/// Parse every `Cookie` header into a name/value map.
pub(crate) fn parse_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let value = value.trim().trim_matches('"');
            Some((name.trim().to_string(), value.to_string()))
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_query_repeated_keys() {
        let q = parse_query("a=1&b=two&a=3");
        assert_eq!(q["a"], serde_json::json!(["1", "3"]));
        assert_eq!(q["b"], serde_json::json!("two"));
    }

    #[test]
    fn test_parse_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("name=john; theme=\"dark\""));
        let cookies = parse_cookies(&headers);
        assert_eq!(cookies.get("name").map(String::as_str), Some("john"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
    }

    #[tokio::test]
    async fn test_load_parses_json_and_keeps_body() {
        let req = Request::builder()
            .uri("/users?active=true")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"name":"john"}"#))
            .unwrap();

        let (req, data) = RequestData::load(req).await.unwrap();
        assert_eq!(data.body, serde_json::json!({ "name": "john" }));
        assert_eq!(data.query["active"], serde_json::json!("true"));

        let bytes = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], br#"{"name":"john"}"#);
    }

    #[tokio::test]
    async fn test_load_rejects_malformed_json() {
        let req = Request::builder()
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let err = RequestData::load(req).await.unwrap_err();
        assert!(matches!(err, HandlerError::MalformedBody(_)));
    }

    #[tokio::test]
    async fn test_reload_sees_rewritten_request() {
        let req = Request::builder()
            .uri("/items?name=orig")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("[1,2]"))
            .unwrap();
        let (mut req, first) = RequestData::load(req).await.unwrap();
        assert_eq!(first.query["name"], serde_json::json!("orig"));

        *req.uri_mut() = "/items?name=rewritten".parse().unwrap();
        let (_, second) = RequestData::load(req).await.unwrap();
        assert_eq!(second.query["name"], serde_json::json!("rewritten"));
        assert_eq!(second.body, serde_json::json!([1, 2]));
    }

    #[tokio::test]
    async fn test_reload_picks_up_late_uploads() {
        let req = Request::builder().body(Body::empty()).unwrap();
        let (mut req, first) = RequestData::load(req).await.unwrap();
        assert!(first.file_upload.is_none());

        req.extensions_mut().insert(UploadedFiles(vec![UploadedFile {
            field_name: "doc".into(),
            file_name: "a.pdf".into(),
            content_type: "application/pdf".into(),
            size: 10,
        }]));
        let (_, second) = RequestData::load(req).await.unwrap();
        assert_eq!(second.file_upload.as_ref().map(UploadedFiles::len), Some(1));
    }
}
