//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::middleware::Next;
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use tower_http::normalize_path::NormalizePath;

use expressive::config::AppConfig;
use expressive::http::middleware::Middleware;
use expressive::{AppOptions, HttpServer, RouterTree};

pub type App = NormalizePath<Router>;

/// Build the full application service with default configuration.
pub fn app(tree: RouterTree, options: AppOptions) -> App {
    app_with_config(AppConfig::default(), tree, options)
}

pub fn app_with_config(config: AppConfig, tree: RouterTree, options: AppOptions) -> App {
    HttpServer::new(config, tree, options)
        .expect("tree compiles")
        .into_service()
}

pub fn request(method: Method, uri: &str) -> Request {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn get(uri: &str) -> Request {
    request(Method::GET, uri)
}

pub fn json(method: Method, uri: &str, body: Value) -> Request {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Send one request through `app`; non-JSON bodies decode as `Null`.
pub async fn send(app: &App, req: Request) -> (StatusCode, HeaderMap, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, body)
}

/// Ordered record of which stages ran.
#[derive(Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<String>>>);

impl Trace {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Middleware that records `label` and continues.
    pub fn middleware(&self, label: &'static str) -> Middleware {
        let trace = self.clone();
        Middleware::named(label, move |req: Request, next: Next| {
            trace.push(label);
            async move { Ok(next.run(req).await) }
        })
    }
}
