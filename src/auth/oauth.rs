//! GitHub OAuth2 authorization-code handshake.
//!
//! `authorization_url` issues a single-use `state` and builds the GitHub
//! authorize URL; `exchange_code` redeems the state, trades the code for an
//! access token and resolves that token through the token authenticator.

use std::{sync::Arc, time::Duration};

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use rand::RngCore;
use reqwest::header;
use serde::Deserialize;
use tokio::time::Instant;
use url::Url;

use super::{AuthError, AuthType, GitHubTokenAuthenticator, Identity};
use crate::{config::GitHubOAuthConfig, observability::metrics};

/// Number of random bytes in an issued state token.
const STATE_BYTES: usize = 32;

/// Default handshake window.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(15 * 60);

/// An issued, not yet redeemed authorization request.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    pub state: String,
    pub redirect_uri: String,
    pub created_at: Instant,
}

/// Single-use, time-bounded CSRF tokens for the authorization-code flow.
///
/// A state is removed by the first `redeem` that finds it, whether or not
/// the code exchange that follows succeeds.
pub struct OAuthStateStore {
    pending: DashMap<String, PendingAuthorization>,
    max_age: Duration,
}

impl OAuthStateStore {
    pub fn new(max_age: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            max_age,
        }
    }

    /// Issue a fresh state bound to `redirect_uri`.
    ///
    /// Also drops every entry older than the handshake window.
    pub fn issue(&self, redirect_uri: &str) -> String {
        self.purge_expired();

        let mut bytes = [0u8; STATE_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let state = URL_SAFE_NO_PAD.encode(bytes);

        self.pending.insert(
            state.clone(),
            PendingAuthorization {
                state: state.clone(),
                redirect_uri: redirect_uri.to_string(),
                created_at: Instant::now(),
            },
        );
        state
    }

    /// Consume a state.
    pub fn redeem(&self, state: &str) -> Result<PendingAuthorization, AuthError> {
        let (_, pending) = self.pending.remove(state).ok_or(AuthError::InvalidState)?;
        if pending.created_at.elapsed() > self.max_age {
            return Err(AuthError::ExpiredState);
        }
        Ok(pending)
    }

    pub fn purge_expired(&self) {
        let max_age = self.max_age;
        self.pending
            .retain(|_, pending| pending.created_at.elapsed() <= max_age);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Derive the GitHub web host from the REST API base.
///
/// - `https://api.github.com` becomes `https://github.com`
/// - `https://ghe.example.com/api/v3` becomes `https://ghe.example.com`
/// - anything else is used as is
pub fn web_base_url(api_base: &str) -> String {
    let api_base = api_base.trim_end_matches('/');
    if api_base.contains("api.github.com") {
        "https://github.com".to_string()
    } else if let Some(host) = api_base.strip_suffix("/api/v3") {
        host.to_string()
    } else {
        api_base.to_string()
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct GitHubOAuthAuthenticator {
    client_id: String,
    client_secret: String,
    default_redirect_uri: Option<String>,
    scopes: Vec<String>,
    web_base: String,
    http_client: reqwest::Client,
    timeout: Duration,
    states: OAuthStateStore,
    token_auth: Arc<GitHubTokenAuthenticator>,
}

impl GitHubOAuthAuthenticator {
    pub fn new(
        config: &GitHubOAuthConfig,
        token_auth: Arc<GitHubTokenAuthenticator>,
        http_client: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            default_redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            web_base: web_base_url(token_auth.api_base()),
            http_client,
            timeout,
            states: OAuthStateStore::new(config.state_ttl()),
            token_auth,
        }
    }

    /// Build the GitHub authorize URL and issue the state it carries.
    ///
    /// Returns `(authorize_url, state)`. The redirect URI falls back to the
    /// configured one.
    pub fn authorization_url(
        &self,
        redirect_uri: Option<&str>,
    ) -> Result<(String, String), AuthError> {
        let redirect_uri = redirect_uri
            .or(self.default_redirect_uri.as_deref())
            .ok_or_else(|| AuthError::InvalidRequest("redirect_uri is required".into()))?;

        let mut url = Url::parse(&format!("{}/login/oauth/authorize", self.web_base))
            .map_err(|e| AuthError::Internal(format!("Invalid authorize URL: {e}")))?;

        let state = self.states.issue(redirect_uri);
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", &state);

        Ok((url.to_string(), state))
    }

    /// Redeem `state`, exchange `code` for an access token and resolve it.
    #[tracing::instrument(skip_all, fields(provider = "github_oauth"))]
    pub async fn exchange_code(&self, code: &str, state: &str) -> Result<Identity, AuthError> {
        let pending = self.states.redeem(state)?;

        let url = format!("{}/login/oauth/access_token", self.web_base);
        let response = self
            .http_client
            .post(&url)
            .timeout(self.timeout)
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", pending.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                metrics::record_provider_request("github", "access_token", "error");
                tracing::error!(error = %e, "Failed to exchange code for token");
                AuthError::ProviderUnavailable(format!("Token exchange failed: {e}"))
            })?;

        let status = response.status();
        metrics::record_provider_request("github", "access_token", status.as_str());
        if !status.is_success() {
            tracing::warn!(status = %status, "Token endpoint returned error");
            return Err(AuthError::Unauthenticated);
        }

        let tokens: AccessTokenResponse = response.json().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse token response");
            AuthError::Unauthenticated
        })?;
        let access_token = match tokens.access_token {
            Some(token) if !token.is_empty() => token,
            _ => {
                tracing::warn!(error = ?tokens.error, "Token response carried no access token");
                return Err(AuthError::Unauthenticated);
            }
        };

        let mut identity = self.authenticate(&access_token).await?;
        identity.access_token = Some(access_token);
        Ok(identity)
    }

    /// Resolve a bearer token obtained through the handshake.
    pub async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let mut identity = self.token_auth.authenticate(token).await?;
        identity.auth_type = AuthType::OAuth;
        Ok(identity)
    }
}
