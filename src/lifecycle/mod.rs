//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Trigger → every subscriber (server loop) stops accepting → drain → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - One broadcast coordinator; the server and tests share the same path
//! - Shutdown has timeout: in-flight requests are bounded by the request timeout

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
