//! Metrics collection and exposition.
//!
//! # Metrics
//! - `expressive_dispatch_total` (counter): controller dispatches by `outcome`
//!   (responded, no_response, error_handled, error_forwarded)
//! - `expressive_validation_failures_total` (counter): rejected requests by `section`
//!
//! # Design Decisions
//! - Recording without an installed recorder is a no-op, so library users
//!   and tests pay nothing
//! - The Prometheus exporter serves its own listener

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const DISPATCH_TOTAL: &str = "expressive_dispatch_total";
pub const VALIDATION_FAILURES_TOTAL: &str = "expressive_validation_failures_total";

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    metrics::describe_counter!(DISPATCH_TOTAL, "Controller dispatches by outcome");
    metrics::describe_counter!(
        VALIDATION_FAILURES_TOTAL,
        "Requests rejected by schema or upload validation"
    );
    tracing::info!(address = %addr, "Metrics endpoint started");
    Ok(())
}

pub fn record_dispatch(outcome: &'static str) {
    metrics::counter!(DISPATCH_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_validation_failure(section: &'static str) {
    metrics::counter!(VALIDATION_FAILURES_TOTAL, "section" => section).increment(1);
}
