//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Compile the application route tree under the configured base path
//! - Apply application-wide middleware and authorizer
//! - Wire up the ambient stack (request ID, tracing, timeout, body limit,
//!   JSON default, error pipeline)
//! - Bind server to listener and shut down gracefully

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::Response;
use axum::{Router, ServiceExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::Layer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::ComposeError;
use crate::http::middleware::authorization::{AuthObjectHandler, Authorizer};
use crate::http::middleware::errors::{default_error_handler, render_forwarded, AppErrorHandler};
use crate::http::middleware::validation::{SchemaValidator, ValidationErrorHandler};
use crate::http::middleware::{ChainBuilder, Middleware};
use crate::http::request::{MakeRequestUuid, X_REQUEST_ID};
use crate::http::response;
use crate::routing::{Registration, RouterFactory};
use crate::tree::{RouterTree, Subroute};

/// Application-wide settings that are code, not configuration.
#[derive(Clone)]
pub struct AppOptions {
    chains: ChainBuilder,
    authorizer: Option<Authorizer>,
    middleware: Vec<Middleware>,
    error_handler: AppErrorHandler,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            chains: ChainBuilder::default(),
            authorizer: None,
            middleware: Vec::new(),
            error_handler: Arc::new(default_error_handler),
        }
    }
}

impl AppOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver used by every `authorizer` in the tree.
    pub fn auth_object_handler(mut self, handler: AuthObjectHandler) -> Self {
        self.chains = self.chains.auth_object_handler(handler);
        self
    }

    /// Authorizer guarding the whole tree.
    pub fn authorizer(mut self, authorizer: Authorizer) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    /// Middleware run before every route, after the app authorizer.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn validator(mut self, validator: impl SchemaValidator) -> Self {
        self.chains = self.chains.validator(validator);
        self
    }

    pub fn validation_error_handler(mut self, handler: ValidationErrorHandler) -> Self {
        self.chains = self.chains.validation_error_handler(handler);
        self
    }

    /// Renders errors forwarded by controllers and middleware.
    pub fn error_handler(mut self, handler: AppErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }
}

impl std::fmt::Debug for AppOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppOptions")
            .field("chains", &self.chains)
            .field("authorizer", &self.authorizer)
            .field("middleware", &self.middleware)
            .finish_non_exhaustive()
    }
}

/// HTTP server for a compiled route tree.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
    registrations: Vec<Registration>,
}

impl HttpServer {
    /// Compile `tree` and build the full middleware stack.
    ///
    /// Fails without serving anything if the tree does not compile.
    pub fn new(config: AppConfig, tree: RouterTree, options: AppOptions) -> Result<Self, ComposeError> {
        let mut root = Subroute::new(config.app.base_path.clone(), tree);
        root.authorizer = options.authorizer;
        root.middleware = options.middleware;

        let compiled = RouterFactory::new(options.chains).compile(&RouterTree::new().subroute(root))?;
        let router = Self::build_router(&config, compiled.router, options.error_handler);

        tracing::info!(
            base_path = %config.app.base_path,
            routes = compiled.registrations.len(),
            "Application router ready"
        );
        Ok(Self {
            router,
            config,
            registrations: compiled.registrations,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, routes: Router, error_handler: AppErrorHandler) -> Router {
        let request_id_header = HeaderName::from_bytes(config.app.request_id_header.as_bytes())
            .unwrap_or_else(|_| HeaderName::from_static(X_REQUEST_ID));
        let span_header = request_id_header.clone();

        routes
            .fallback(not_found)
            .layer(from_fn(move |req: Request, next: Next| {
                render_forwarded(error_handler.clone(), req, next)
            }))
            .layer(SetResponseHeaderLayer::if_not_present(
                CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            ))
            .layer(RequestBodyLimitLayer::new(config.app.body_limit_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
            .layer(TraceLayer::new_for_http().make_span_with(move |req: &Request<Body>| {
                let request_id = req
                    .headers()
                    .get(&span_header)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
    }

    /// Every endpoint the server answers, in registration order.
    pub fn registrations(&self) -> &[Registration] {
        &self.registrations
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The complete service, with trailing slashes trimmed before routing.
    pub fn into_service(self) -> NormalizePath<Router> {
        NormalizePathLayer::trim_trailing_slash().layer(self.router)
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = ServiceExt::<Request>::into_make_service(self.into_service());
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn not_found() -> Response {
    response::message(StatusCode::NOT_FOUND, "Not Found")
}
