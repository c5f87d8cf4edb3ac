use std::{collections::BTreeSet, sync::Arc, time::Duration};

use reqwest::{StatusCode, header};
use serde::Deserialize;

use super::{AuthError, AuthType, Identity, fanout::bounded_parallel_map};
use crate::{
    authz::{GroupMembership, RolePriority, TeamMapping},
    cache::{CacheKeys, TtlCache},
    config::{GitHubAuthConfig, MAX_MEMBERSHIP_CHECKS},
    observability::metrics,
};

const GITHUB_ACCEPT: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("sessiongate/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct GitHubUser {
    login: String,
    id: u64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TeamMembership {
    state: String,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserTeam {
    slug: String,
    organization: TeamOrganization,
}

#[derive(Debug, Deserialize)]
struct TeamOrganization {
    login: String,
}

/// Authenticates GitHub personal and OAuth access tokens.
///
/// The token owner's memberships are resolved only for the teams named by
/// the rule table: every literal `org/team` key gets its own membership
/// check (at most [`MAX_MEMBERSHIP_CHECKS`] in flight), and wildcard keys are
/// matched against the user's team listing. Resolved identities are cached
/// by token hash.
pub struct GitHubTokenAuthenticator {
    http_client: reqwest::Client,
    api_base: String,
    mapping: TeamMapping,
    role_priority: Arc<RolePriority>,
    max_concurrent_checks: usize,
    timeout: Duration,
    cache: TtlCache<String, Identity>,
}

impl GitHubTokenAuthenticator {
    pub fn new(
        config: &GitHubAuthConfig,
        role_priority: Arc<RolePriority>,
        http_client: reqwest::Client,
        cache_ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            mapping: config.team_mapping(),
            role_priority,
            max_concurrent_checks: config
                .max_concurrent_checks
                .clamp(1, MAX_MEMBERSHIP_CHECKS),
            timeout,
            cache: TtlCache::new("github", cache_ttl),
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Resolve a token into an identity, consulting the cache first.
    #[tracing::instrument(skip_all, fields(provider = "github"))]
    pub async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let cache_key = CacheKeys::github_token(token);
        if let Some(identity) = self.cache.get(&cache_key) {
            tracing::debug!(subject = %identity.subject_id, "GitHub identity served from cache");
            return Ok(identity);
        }

        let user = self.fetch_user(token).await?;

        let mut memberships: BTreeSet<GroupMembership> =
            self.check_memberships(token, &user.login).await;
        if self.mapping.has_wildcard_rules() {
            memberships.extend(self.list_matching_teams(token).await);
        }
        let memberships: Vec<GroupMembership> = memberships.into_iter().collect();

        let resolution = self.mapping.resolve(&memberships, &self.role_priority);
        let mut teams: Vec<String> = memberships.iter().map(GroupMembership::team_id).collect();
        teams.dedup();

        let mut identity = Identity::from_resolution(&user.login, AuthType::GitHub, resolution, teams)
            .with_metadata("login", &user.login)
            .with_metadata("id", user.id.to_string());
        if let Some(name) = user.name.filter(|n| !n.is_empty()) {
            identity = identity.with_metadata("name", name);
        }

        tracing::info!(
            subject = %identity.subject_id,
            role = %identity.role,
            teams = identity.teams.len(),
            "GitHub token authenticated"
        );

        self.cache.set(cache_key, identity.clone());
        Ok(identity)
    }

    fn get(&self, url: &str, token: &str) -> reqwest::RequestBuilder {
        self.http_client
            .get(url)
            .timeout(self.timeout)
            .header(header::AUTHORIZATION, format!("token {token}"))
            .header(header::ACCEPT, GITHUB_ACCEPT)
            .header(header::USER_AGENT, USER_AGENT)
    }

    async fn fetch_user(&self, token: &str) -> Result<GitHubUser, AuthError> {
        let url = format!("{}/user", self.api_base);
        let response = self.get(&url, token).send().await.map_err(|e| {
            metrics::record_provider_request("github", "user", "error");
            tracing::warn!(error = %e, "GitHub user lookup failed");
            AuthError::ProviderUnavailable(format!("GitHub user lookup failed: {e}"))
        })?;

        let status = response.status();
        metrics::record_provider_request("github", "user", status.as_str());
        if status != StatusCode::OK {
            tracing::debug!(status = %status, "GitHub rejected token");
            return Err(AuthError::Unauthenticated);
        }

        response.json::<GitHubUser>().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse GitHub user response");
            AuthError::ProviderUnavailable(format!("Invalid GitHub user response: {e}"))
        })
    }

    /// Check every literal `org/team` rule key with bounded concurrency.
    ///
    /// Waits for all checks before returning; arrival order is irrelevant
    /// since the result is a set.
    async fn check_memberships(&self, token: &str, login: &str) -> BTreeSet<GroupMembership> {
        let pairs = self.mapping.literal_pairs();
        if pairs.is_empty() {
            return BTreeSet::new();
        }

        bounded_parallel_map(pairs, self.max_concurrent_checks, |(org, team)| async move {
            self.check_membership(token, &org, &team, login).await
        })
        .await
        .into_iter()
        .flatten()
        .collect()
    }

    async fn check_membership(
        &self,
        token: &str,
        org: &str,
        team: &str,
        login: &str,
    ) -> Option<GroupMembership> {
        let url = format!(
            "{}/orgs/{org}/teams/{team}/memberships/{login}",
            self.api_base
        );
        let response = match self.get(&url, token).send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_provider_request("github", "team_membership", "error");
                tracing::warn!(org, team, error = %e, "Team membership check failed");
                return None;
            }
        };

        let status = response.status();
        metrics::record_provider_request("github", "team_membership", status.as_str());
        match status {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return None,
            other => {
                tracing::warn!(org, team, status = %other, "Unexpected team membership status");
                return None;
            }
        }

        match response.json::<TeamMembership>().await {
            Ok(membership) if membership.state == "active" => Some(GroupMembership::new(
                org,
                team,
                membership.role.unwrap_or_else(|| "member".to_string()),
            )),
            Ok(membership) => {
                tracing::debug!(org, team, state = %membership.state, "Team membership not active");
                None
            }
            Err(e) => {
                tracing::warn!(org, team, error = %e, "Failed to parse team membership");
                None
            }
        }
    }

    /// List the user's teams and keep those matched by some rule key.
    async fn list_matching_teams(&self, token: &str) -> Vec<GroupMembership> {
        let url = format!("{}/user/teams?per_page=100", self.api_base);
        let response = match self.get(&url, token).send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_provider_request("github", "user_teams", "error");
                tracing::warn!(error = %e, "Listing user teams failed");
                return Vec::new();
            }
        };

        let status = response.status();
        metrics::record_provider_request("github", "user_teams", status.as_str());
        if status != StatusCode::OK {
            tracing::warn!(status = %status, "Unexpected user teams status");
            return Vec::new();
        }

        match response.json::<Vec<UserTeam>>().await {
            Ok(teams) => teams
                .into_iter()
                .filter(|t| self.mapping.matches_any(&t.organization.login, &t.slug))
                .map(|t| GroupMembership::new(t.organization.login, t.slug, "member"))
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse user teams");
                Vec::new()
            }
        }
    }
}
