//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Composition and dispatch produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (dispatch outcomes, validation failures)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every log event of a request (TraceLayer span)
//! - Metrics are cheap (atomic increments); no recorder means no-op

pub mod logging;
pub mod metrics;
