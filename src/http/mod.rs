//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, ambient layers, trailing-slash trim)
//!     → request.rs (request ID, parsed request data)
//!     → middleware/ (per-mount and per-route chains)
//!     → controller dispatch
//!     → response.rs (JSON bodies, forwarded errors)
//!     → middleware/errors.rs (render forwarded errors)
//!     → Send to client
//! ```

pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestData, UploadedFile, UploadedFiles, X_REQUEST_ID};
pub use server::{AppOptions, HttpServer};
