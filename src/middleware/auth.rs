use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::{
    AppState,
    auth::{AuthError, extract_credentials},
};

/// Authenticate every non-exempt request and attach the result.
///
/// Exempt path prefixes (health, OAuth handshake, webhooks, metrics) pass
/// through untouched. Everything else must carry a credential some provider
/// accepts; on success an [`crate::auth::AuthenticatedRequest`] is inserted
/// as a request extension.
pub async fn auth_gate_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let auth = &state.config.auth;
    if auth.is_exempt(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let credentials =
        extract_credentials(req.headers(), &auth.api_key_header, &auth.bearer_header)?;
    let authenticated = state.gate.authenticate(&credentials).await?;

    req.extensions_mut().insert(authenticated);
    Ok(next.run(req).await)
}
