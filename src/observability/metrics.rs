//! Prometheus metrics for the session gate.
//!
//! Provides metrics for:
//! - Authentication attempts per provider and their outcome
//! - Identity cache hits, misses and expirations
//! - Outbound identity provider requests

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::counter;
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle for the metrics endpoint.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::debug!("Metrics enabled in config but the 'prometheus' feature is not compiled");
    }
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record one provider's attempt at authenticating a credential.
///
/// `result` is `"success"` or the failure code of the provider error.
pub fn record_auth_attempt(provider: &str, result: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("auth_attempts_total", "provider" => provider.to_string(), "result" => result.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (provider, result);
    }
}

/// Record an authentication error returned to a client.
pub fn record_auth_failure(code: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("auth_failures_total", "code" => code.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = code;
    }
}

/// Record an identity cache operation (`get` hit/miss/expired, `set`).
pub fn record_cache_operation(cache: &str, operation: &str, result: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("auth_cache_operations_total", "cache" => cache.to_string(), "operation" => operation.to_string(), "result" => result.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (cache, operation, result);
    }
}

/// Record an outbound call to an identity provider.
///
/// `status` is the HTTP status code, or `"error"` for transport failures.
pub fn record_provider_request(provider: &str, endpoint: &str, status: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("identity_provider_requests_total", "provider" => provider.to_string(), "endpoint" => endpoint.to_string(), "status" => status.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (provider, endpoint, status);
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
