//! Demo application served by the `expressive` binary.
//!
//! ```text
//! GET    /hello
//! GET    /users
//! POST   /users              body: { name, age? }
//! GET    /users/:userId      params: userId >= 1
//! DELETE /users/:userId
//! GET    /admin/stats        authorizer: ["admin"]
//! ```
//!
//! Bearer tokens `admin-token` and `user-token` resolve to principals with
//! the `admin` and `user` permissions respectively.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::controller::{error_handler, Controller, RequestContext};
use crate::error::{HandlerError, HandlerResult};
use crate::http::middleware::authorization::{AuthObject, AuthObjectHandler, Authorizer};
use crate::http::AppOptions;
use crate::tree::{FieldRule, Route, RouterTree, Subroute, ValidationSchema};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct NewUser {
    name: String,
    age: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct UserParams {
    #[serde(rename = "userId")]
    user_id: String,
}

/// In-memory user storage shared by the user controllers.
#[derive(Debug, Clone, Default)]
pub struct UserStore {
    users: Arc<RwLock<BTreeMap<u64, User>>>,
}

impl UserStore {
    async fn insert(&self, new: NewUser) -> User {
        let mut users = self.users.write().await;
        let id = users.keys().next_back().map_or(1, |last| last + 1);
        let user = User {
            id,
            name: new.name,
            age: new.age,
        };
        users.insert(id, user.clone());
        user
    }
}

struct Hello;

#[async_trait]
impl Controller for Hello {
    async fn handle_request(&self, ctx: &mut RequestContext) -> HandlerResult {
        ctx.ok(json!({ "message": "Hello world" }))
    }
}

struct ListUsers(UserStore);

#[async_trait]
impl Controller for ListUsers {
    async fn handle_request(&self, ctx: &mut RequestContext) -> HandlerResult {
        let users: Vec<User> = self.0.users.read().await.values().cloned().collect();
        ctx.ok(users)
    }
}

struct CreateUser(UserStore);

#[async_trait]
impl Controller for CreateUser {
    async fn handle_request(&self, ctx: &mut RequestContext) -> HandlerResult {
        let new: NewUser = ctx.body_as()?;
        let user = self.0.insert(new).await;
        tracing::info!(user_id = user.id, "User created");
        ctx.created(user)
    }
}

fn user_id(ctx: &RequestContext) -> Result<u64, HandlerError> {
    let params: UserParams = ctx.params_as()?;
    params
        .user_id
        .parse()
        .map_err(|_| HandlerError::http(StatusCode::BAD_REQUEST, "userId must be an integer"))
}

struct GetUser(UserStore);

#[async_trait]
impl Controller for GetUser {
    async fn handle_request(&self, ctx: &mut RequestContext) -> HandlerResult {
        let id = user_id(ctx)?;
        let user = self.0.users.read().await.get(&id).cloned();
        match user {
            Some(user) => ctx.ok(user),
            None => Err(HandlerError::http(StatusCode::NOT_FOUND, "Could not find user")),
        }
    }
}

struct DeleteUser(UserStore);

#[async_trait]
impl Controller for DeleteUser {
    async fn handle_request(&self, ctx: &mut RequestContext) -> HandlerResult {
        let id = user_id(ctx)?;
        match self.0.users.write().await.remove(&id) {
            Some(_) => ctx.no_content(),
            None => ctx.not_found("Could not find user"),
        }
    }
}

struct AdminStats(UserStore);

#[async_trait]
impl Controller for AdminStats {
    async fn handle_request(&self, ctx: &mut RequestContext) -> HandlerResult {
        let users = self.0.users.read().await.len();
        let subject = ctx.auth().and_then(|a| a.subject.clone());
        ctx.ok(json!({ "users": users, "requestedBy": subject }))
    }
}

/// Resolve `Authorization: Bearer <token>` against the demo tokens.
pub fn auth_object_handler() -> AuthObjectHandler {
    AuthObjectHandler::new(|parts: &Parts| {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);
        async move {
            match token.as_deref() {
                Some("admin-token") => Ok(AuthObject::new("admin").with_permission("admin")),
                Some("user-token") => Ok(AuthObject::new("user").with_permission("user")),
                _ => Err(HandlerError::http(StatusCode::UNAUTHORIZED, "Unauthorized")),
            }
        }
    })
}

/// Build the demo tree around `store`.
pub fn tree(store: UserStore) -> RouterTree {
    let user_id_schema = ValidationSchema::new().param("userId", FieldRule::integer().required().min(1.0));

    let users = RouterTree::new()
        .route(Route::get("/", ListUsers(store.clone())).with_doc(json!({ "summary": "List users" })))
        .route(
            Route::post("/", CreateUser(store.clone()))
                .with_schema(
                    ValidationSchema::new()
                        .body("name", FieldRule::string().required().min(1.0))
                        .body("age", FieldRule::integer().min(0.0)),
                )
                .with_doc(json!({ "summary": "Create a user" })),
        )
        .route(
            Route::get("/:userId", GetUser(store.clone()))
                .with_schema(user_id_schema.clone())
                .with_error_handler(error_handler(|err, ctx| match err {
                    HandlerError::Http { status, message } if status == StatusCode::NOT_FOUND => {
                        ctx.not_found(message.as_str())
                    }
                    other => ctx.next(other),
                })),
        )
        .route(Route::delete("/:userId", DeleteUser(store.clone())).with_schema(user_id_schema));

    let admin = RouterTree::new().route(Route::get("/stats", AdminStats(store)));

    RouterTree::new()
        .route(Route::get("/hello", Hello).with_doc(json!({ "summary": "Greeting" })))
        .subroute(Subroute::new("/users", users))
        .subroute(Subroute::new("/admin", admin).with_authorizer(Authorizer::any_of(["admin"])))
}

/// Application options matching [`tree`].
pub fn options() -> AppOptions {
    AppOptions::new().auth_object_handler(auth_object_handler())
}
