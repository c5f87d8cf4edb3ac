//! Observability: structured logging and Prometheus metrics.
//!
//! - Logging goes through `tracing` with a configurable format (pretty, compact, JSON)
//! - Metrics are recorded through the `metrics` facade and exported on `/metrics`
//!   when the `prometheus` feature is enabled; without it every recorder is a no-op

pub mod metrics;
#[cfg(feature = "server")]
mod tracing_init;

#[cfg(feature = "server")]
pub use tracing_init::*;
