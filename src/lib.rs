//! Authentication and authorization gate for per-user backend sessions.
//!
//! Every request is resolved into an [`auth::Identity`] by one of the
//! configured providers (static API keys, GitHub tokens, the GitHub OAuth
//! handshake, AWS IAM access keys), the identity's team memberships are
//! mapped to a role and permission set through wildcard team rules, and the
//! result is expanded into an [`authz::AuthorizationContext`] that request
//! handlers consult for ownership checks.

pub mod auth;
pub mod authz;
pub mod cache;
pub mod config;
pub mod middleware;
pub mod observability;
pub mod routes;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{
    auth::{AuthError, AuthGate},
    config::GatewayConfig,
};

/// Shared state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub gate: Arc<AuthGate>,
}

impl AppState {
    /// Build every configured authenticator.
    pub async fn new(config: GatewayConfig) -> Result<Self, AuthError> {
        let gate = AuthGate::from_config(&config).await?;
        Ok(Self::with_gate(config, gate))
    }

    pub fn with_gate(config: GatewayConfig, gate: AuthGate) -> Self {
        Self {
            config: Arc::new(config),
            gate: Arc::new(gate),
        }
    }
}

/// Assemble the HTTP surface.
///
/// All routes run behind the auth gate; the gate lets exempt path prefixes
/// (health, OAuth handshake, metrics) through without credentials.
pub fn build_app(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/oauth/authorize", get(routes::oauth::authorize))
        .route("/oauth/callback", get(routes::oauth::callback))
        .route("/api/me", get(routes::api::me))
        .route("/api/access", get(routes::api::access));

    if state.config.observability.metrics.enabled {
        router = router.route("/metrics", get(routes::health::metrics));
    }

    router
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_gate_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
