//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     RouterTree
//!     → duplicates.rs (reject duplicate / conflicting endpoints)
//!     → path.rs (normalize, translate templates)
//!     → compose.rs (chains + dispatchers, recursive mounts)
//!     → Freeze as immutable axum Router
//!
//! Incoming Request:
//!     → axum Router (path + verb lookup)
//!     → mount chains → route chain → controller
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Fail fast: a tree either compiles completely or not at all
//! - Deterministic: same tree always yields the same registrations

pub mod compose;
pub mod duplicates;
pub mod path;

pub use compose::{CompiledRouter, Registration, RouterFactory};
