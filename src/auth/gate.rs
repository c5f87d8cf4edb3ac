use std::sync::Arc;

use super::{
    AuthError, AuthenticatedRequest, CloudIamAuthenticator, Credential, GitHubOAuthAuthenticator,
    GitHubTokenAuthenticator, Identity, StaticKeyAuthenticator,
};
use crate::{authz::AuthorizationContext, config::GatewayConfig, observability::metrics};

/// A configured authentication strategy.
#[derive(Clone)]
pub enum Provider {
    StaticKey(Arc<StaticKeyAuthenticator>),
    GitHubToken(Arc<GitHubTokenAuthenticator>),
    GitHubOAuth(Arc<GitHubOAuthAuthenticator>),
    CloudIam(Arc<CloudIamAuthenticator>),
}

impl Provider {
    pub fn name(&self) -> &'static str {
        match self {
            Provider::StaticKey(_) => "static_key",
            Provider::GitHubToken(_) => "github_token",
            Provider::GitHubOAuth(_) => "github_oauth",
            Provider::CloudIam(_) => "cloud_iam",
        }
    }

    pub fn accepts(&self, credential: &Credential) -> bool {
        matches!(
            (self, credential),
            (Provider::StaticKey(_), Credential::ApiKey(_))
                | (Provider::GitHubToken(_), Credential::BearerToken(_))
                | (Provider::GitHubOAuth(_), Credential::BearerToken(_))
                | (Provider::CloudIam(_), Credential::BasicAuth { .. })
        )
    }

    /// Run this provider against a credential it accepts.
    pub async fn authenticate(&self, credential: &Credential) -> Result<Identity, AuthError> {
        match (self, credential) {
            (Provider::StaticKey(auth), Credential::ApiKey(key)) => auth.authenticate(key),
            (Provider::GitHubToken(auth), Credential::BearerToken(token)) => {
                auth.authenticate(token).await
            }
            (Provider::GitHubOAuth(auth), Credential::BearerToken(token)) => {
                auth.authenticate(token).await
            }
            (Provider::CloudIam(auth), Credential::BasicAuth { username, .. }) => {
                auth.authenticate(username).await
            }
            _ => Err(AuthError::Unauthenticated),
        }
    }
}

/// Entry point for request authentication.
///
/// Providers are tried in a fixed order (static key, GitHub token, GitHub
/// OAuth, cloud IAM) against every credential they accept. The first
/// success wins; individual failures are logged and never surface to the
/// caller, which only sees [`AuthError::Unauthenticated`].
pub struct AuthGate {
    providers: Vec<Provider>,
    oauth: Option<Arc<GitHubOAuthAuthenticator>>,
    admin_roles: Vec<String>,
}

impl AuthGate {
    pub fn new(
        providers: Vec<Provider>,
        oauth: Option<Arc<GitHubOAuthAuthenticator>>,
        admin_roles: Vec<String>,
    ) -> Self {
        Self {
            providers,
            oauth,
            admin_roles,
        }
    }

    /// Build every provider enabled in the configuration.
    ///
    /// Cloud IAM clients load AWS credentials here, so this must run inside
    /// the runtime at startup.
    pub async fn from_config(config: &GatewayConfig) -> Result<Self, AuthError> {
        let auth = &config.auth;
        let timeout = config.server.request_timeout();
        let cache_ttl = auth.cache_ttl();
        let role_priority = Arc::new(auth.role_priority());
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(format!("Failed to build HTTP client: {e}")))?;

        let mut providers = Vec::new();
        let mut oauth = None;

        if let Some(static_keys) = &auth.static_keys {
            let authenticator = StaticKeyAuthenticator::new(static_keys);
            tracing::info!(keys = authenticator.len(), "Static key authentication enabled");
            providers.push(Provider::StaticKey(Arc::new(authenticator)));
        }

        if let Some(github) = &auth.github {
            let token_auth = Arc::new(GitHubTokenAuthenticator::new(
                github,
                role_priority.clone(),
                http_client.clone(),
                cache_ttl,
                timeout,
            ));
            if github.token_auth {
                tracing::info!(api_base = %github.api_base, rules = github.teams.len(), "GitHub token authentication enabled");
                providers.push(Provider::GitHubToken(token_auth.clone()));
            }
            if let Some(oauth_config) = &github.oauth {
                let authenticator = Arc::new(GitHubOAuthAuthenticator::new(
                    oauth_config,
                    token_auth,
                    http_client.clone(),
                    timeout,
                ));
                // With direct token auth enabled the token provider already
                // covers bearer tokens; OAuth then only serves the handshake.
                if !github.token_auth {
                    providers.push(Provider::GitHubOAuth(authenticator.clone()));
                }
                tracing::info!("GitHub OAuth enabled");
                oauth = Some(authenticator);
            }
        }

        if let Some(cloud_iam) = &auth.cloud_iam {
            #[cfg(feature = "cloud-iam")]
            {
                let directory = Arc::new(super::AwsIamDirectory::new(cloud_iam).await);
                providers.push(Provider::CloudIam(Arc::new(CloudIamAuthenticator::new(
                    cloud_iam,
                    directory,
                    role_priority.clone(),
                    cache_ttl,
                    timeout,
                ))));
                tracing::info!(tag = %cloud_iam.team_tag_key, "Cloud IAM authentication enabled");
            }
            #[cfg(not(feature = "cloud-iam"))]
            {
                let _ = cloud_iam;
                return Err(AuthError::NotConfigured("Cloud IAM (feature 'cloud-iam')"));
            }
        }

        Ok(Self::new(providers, oauth, auth.admin_roles.clone()))
    }

    pub fn providers(&self) -> &[Provider] {
        &self.providers
    }

    pub fn oauth(&self) -> Option<&Arc<GitHubOAuthAuthenticator>> {
        self.oauth.as_ref()
    }

    /// Wrap an identity in its authorization context.
    pub fn authorize(&self, identity: Identity) -> AuthenticatedRequest {
        AuthenticatedRequest::new(AuthorizationContext::build(identity, &self.admin_roles))
    }

    /// Authenticate a request from the credentials it presented.
    pub async fn authenticate(
        &self,
        credentials: &[Credential],
    ) -> Result<AuthenticatedRequest, AuthError> {
        if credentials.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        for provider in &self.providers {
            for credential in credentials.iter().filter(|c| provider.accepts(c)) {
                match provider.authenticate(credential).await {
                    Ok(identity) => {
                        metrics::record_auth_attempt(provider.name(), "success");
                        tracing::debug!(
                            provider = provider.name(),
                            subject = %identity.subject_id,
                            role = %identity.role,
                            "Request authenticated"
                        );
                        return Ok(self.authorize(identity));
                    }
                    Err(e) => {
                        metrics::record_auth_attempt(provider.name(), e.code());
                        tracing::warn!(
                            provider = provider.name(),
                            credential = credential.kind(),
                            error = %e,
                            "Provider declined credential"
                        );
                    }
                }
            }
        }

        Err(AuthError::Unauthenticated)
    }
}
