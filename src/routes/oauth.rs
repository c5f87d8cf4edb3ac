//! GitHub OAuth2 handshake routes.
//!
//! - `/oauth/authorize` - Issues a state and redirects to GitHub
//! - `/oauth/callback` - Redeems the state and exchanges the code
//!
//! Both are exempt from the auth gate; the state token is their protection.

use std::collections::BTreeSet;

use axum::{
    Json,
    extract::{Query, State},
    response::Redirect,
};
use serde::{Deserialize, Serialize};

use crate::{AppState, auth::AuthError};

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    /// Overrides the configured callback URL
    pub redirect_uri: Option<String>,
}

/// Redirect the browser to the GitHub authorize page.
pub async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Redirect, AuthError> {
    let oauth = state
        .gate
        .oauth()
        .ok_or(AuthError::NotConfigured("GitHub OAuth"))?;
    let (url, _) = oauth.authorization_url(query.redirect_uri.as_deref())?;
    Ok(Redirect::to(&url))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by GitHub when the user denied access
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub subject: String,
    pub role: String,
    pub permissions: BTreeSet<String>,
    pub teams: Vec<String>,
    pub access_token: Option<String>,
}

/// Complete the handshake and return the resolved identity.
pub async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<CallbackResponse>, AuthError> {
    let oauth = state
        .gate
        .oauth()
        .ok_or(AuthError::NotConfigured("GitHub OAuth"))?;

    if let Some(error) = &query.error {
        tracing::warn!(
            error = %error,
            description = query.error_description.as_deref().unwrap_or("Unknown error"),
            "OAuth provider returned an error"
        );
        return Err(AuthError::Unauthenticated);
    }

    let (Some(code), Some(oauth_state)) = (query.code.as_deref(), query.state.as_deref()) else {
        return Err(AuthError::InvalidRequest(
            "code and state query parameters are required".into(),
        ));
    };

    let identity = oauth.exchange_code(code, oauth_state).await?;
    tracing::info!(subject = %identity.subject_id, role = %identity.role, "OAuth login completed");

    Ok(Json(CallbackResponse {
        subject: identity.subject_id,
        role: identity.role,
        permissions: identity.permissions,
        teams: identity.teams,
        access_token: identity.access_token,
    }))
}
