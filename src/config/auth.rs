use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::authz::{RolePriority, TeamMapping, TeamRule, is_valid_team_pattern};

/// Authentication configuration.
///
/// Providers are tried in a fixed order: static keys, GitHub token,
/// GitHub OAuth, cloud IAM. Each is enabled by the presence of its section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Header carrying a static API key.
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Header carrying a bearer token (`Bearer <token>` or `token <token>`).
    #[serde(default = "default_bearer_header")]
    pub bearer_header: String,

    /// Paths that bypass authentication entirely. An entry ending in `/`
    /// matches everything below it; otherwise it matches the path itself and
    /// its sub-paths (`/health` covers `/health/live`, not `/healthz`).
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,

    /// TTL for cached provider identities, in seconds. 0 disables caching.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Role ranks used to pick the winning role among matched team rules.
    /// Higher wins; roles missing here never upgrade.
    #[serde(default = "default_role_priority")]
    pub role_priority: HashMap<String, i32>,

    /// Roles that get administrative scope.
    #[serde(default = "default_admin_roles")]
    pub admin_roles: Vec<String>,

    #[serde(default)]
    pub static_keys: Option<StaticKeysConfig>,

    #[serde(default)]
    pub github: Option<GitHubAuthConfig>,

    #[serde(default)]
    pub cloud_iam: Option<CloudIamConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_key_header: default_api_key_header(),
            bearer_header: default_bearer_header(),
            exempt_paths: default_exempt_paths(),
            cache_ttl_secs: default_cache_ttl(),
            role_priority: default_role_priority(),
            admin_roles: default_admin_roles(),
            static_keys: None,
            github: None,
            cloud_iam: None,
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.static_keys.is_none() && self.github.is_none() && self.cloud_iam.is_none() {
            return Err(ConfigError::Validation(
                "At least one of auth.static_keys, auth.github or auth.cloud_iam must be configured"
                    .into(),
            ));
        }

        if let Some(static_keys) = &self.static_keys {
            static_keys.validate()?;
        }
        if let Some(github) = &self.github {
            github.validate()?;
        }
        if let Some(cloud_iam) = &self.cloud_iam {
            #[cfg(not(feature = "cloud-iam"))]
            {
                let _ = cloud_iam;
                return Err(ConfigError::Validation(
                    "auth.cloud_iam requires the 'cloud-iam' feature. \
                     Rebuild with: cargo build --features cloud-iam"
                        .into(),
                ));
            }
            #[cfg(feature = "cloud-iam")]
            cloud_iam.validate()?;
        }
        Ok(())
    }

    /// Whether a request path bypasses the gate.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|exempt| {
            if exempt.ends_with('/') {
                return path.starts_with(exempt.as_str());
            }
            path.strip_prefix(exempt.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn role_priority(&self) -> RolePriority {
        RolePriority::new(self.role_priority.clone())
    }
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

fn default_bearer_header() -> String {
    "Authorization".to_string()
}

fn default_exempt_paths() -> Vec<String> {
    ["/health", "/oauth/", "/webhooks/", "/metrics"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_role_priority() -> HashMap<String, i32> {
    [("admin", 100), ("developer", 50), ("user", 10), ("guest", 0)]
        .into_iter()
        .map(|(role, rank)| (role.to_string(), rank))
        .collect()
}

fn default_admin_roles() -> Vec<String> {
    vec!["admin".to_string()]
}

fn default_guest_role() -> String {
    "guest".to_string()
}

fn validate_team_rules(section: &str, teams: &BTreeMap<String, TeamRule>) -> Result<(), ConfigError> {
    for (pattern, rule) in teams {
        if !is_valid_team_pattern(pattern) {
            return Err(ConfigError::Validation(format!(
                "{section}.teams key '{pattern}' must have the form '<org>/<team>' with exactly one '/'"
            )));
        }
        if rule.role.is_empty() {
            return Err(ConfigError::Validation(format!(
                "{section}.teams.\"{pattern}\".role cannot be empty"
            )));
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Static keys
// ─────────────────────────────────────────────────────────────────────────────

/// Static API keys, keyed by the raw key value.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticKeysConfig {
    #[serde(default)]
    pub keys: HashMap<String, StaticKeyEntry>,
}

impl fmt::Debug for StaticKeysConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeysConfig")
            .field("keys", &format!("[{} keys]", self.keys.len()))
            .finish()
    }
}

impl StaticKeysConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.keys.keys().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "auth.static_keys.keys cannot contain an empty key".into(),
            ));
        }
        if let Some(entry) = self.keys.values().find(|e| e.subject.is_empty()) {
            return Err(ConfigError::Validation(format!(
                "auth.static_keys entry with role '{}' has an empty subject",
                entry.role
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaticKeyEntry {
    /// Subject identifier reported for this key.
    pub subject: String,

    pub role: String,

    #[serde(default)]
    pub permissions: Vec<String>,

    /// Team (`org/team`) a service key is bound to.
    #[serde(default)]
    pub team: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// GitHub
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitHubAuthConfig {
    /// REST API base. Use `https://<host>/api/v3` for GitHub Enterprise.
    #[serde(default = "default_github_api_base")]
    pub api_base: String,

    /// Accept personal/OAuth tokens directly as bearer credentials.
    #[serde(default = "default_true")]
    pub token_auth: bool,

    #[serde(default = "default_guest_role")]
    pub default_role: String,

    #[serde(default)]
    pub default_permissions: Vec<String>,

    /// Concurrent team-membership checks per authentication, at most
    /// [`MAX_MEMBERSHIP_CHECKS`].
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: usize,

    /// Team rules keyed by `"<org-pattern>/<team-pattern>"`.
    #[serde(default)]
    pub teams: BTreeMap<String, TeamRule>,

    #[serde(default)]
    pub oauth: Option<GitHubOAuthConfig>,
}

impl GitHubAuthConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.api_base).map_err(|e| {
            ConfigError::Validation(format!("auth.github.api_base is not a valid URL: {e}"))
        })?;
        if !(1..=MAX_MEMBERSHIP_CHECKS).contains(&self.max_concurrent_checks) {
            return Err(ConfigError::Validation(format!(
                "auth.github.max_concurrent_checks must be between 1 and {MAX_MEMBERSHIP_CHECKS}"
            )));
        }
        if !self.token_auth && self.oauth.is_none() {
            return Err(ConfigError::Validation(
                "auth.github needs token_auth = true or an [auth.github.oauth] section".into(),
            ));
        }
        validate_team_rules("auth.github", &self.teams)?;
        if let Some(oauth) = &self.oauth {
            oauth.validate()?;
        }
        Ok(())
    }

    pub fn team_mapping(&self) -> TeamMapping {
        TeamMapping::new(
            self.teams.clone(),
            self.default_role.clone(),
            self.default_permissions.clone(),
        )
    }
}

fn default_github_api_base() -> String {
    "https://api.github.com".to_string()
}

/// Hard cap on in-flight GitHub team-membership checks.
pub const MAX_MEMBERSHIP_CHECKS: usize = 3;

fn default_max_concurrent_checks() -> usize {
    MAX_MEMBERSHIP_CHECKS
}

/// GitHub OAuth App settings for the authorization-code handshake.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitHubOAuthConfig {
    pub client_id: String,

    pub client_secret: String,

    /// Callback URL registered with the OAuth App. Used when the authorize
    /// request does not name one.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    #[serde(default = "default_oauth_scopes")]
    pub scopes: Vec<String>,

    /// How long an issued `state` stays redeemable, in seconds.
    #[serde(default = "default_state_ttl")]
    pub state_ttl_secs: u64,
}

impl fmt::Debug for GitHubOAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubOAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"****")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("state_ttl_secs", &self.state_ttl_secs)
            .finish()
    }
}

impl GitHubOAuthConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(ConfigError::Validation(
                "auth.github.oauth requires client_id and client_secret".into(),
            ));
        }
        if self.state_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "auth.github.oauth.state_ttl_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }
}

fn default_oauth_scopes() -> Vec<String> {
    vec!["read:org".to_string(), "read:user".to_string()]
}

fn default_state_ttl() -> u64 {
    900
}

// ─────────────────────────────────────────────────────────────────────────────
// Cloud IAM
// ─────────────────────────────────────────────────────────────────────────────

/// Access-key authentication against AWS IAM.
///
/// The caller's access key ID arrives as the Basic-auth username. The gate
/// looks up the owning IAM user with its own credentials and maps the user's
/// team tag through the team rules. The secret is not verified here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CloudIamConfig {
    /// AWS region. Uses the default provider chain when omitted.
    #[serde(default)]
    pub region: Option<String>,

    /// Custom endpoint for IAM/STS (LocalStack and friends).
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Tag holding the user's teams.
    #[serde(default = "default_team_tag_key")]
    pub team_tag_key: String,

    #[serde(default = "default_team_delimiter")]
    pub team_delimiter: String,

    /// Organization half of team ids for tag values without a `/`.
    #[serde(default = "default_organization")]
    pub organization: String,

    #[serde(default)]
    pub required_tag_key: Option<String>,

    #[serde(default)]
    pub required_tag_value: Option<String>,

    #[serde(default)]
    pub required_account_id: Option<String>,

    #[serde(default = "default_access_key_length")]
    pub access_key_length: usize,

    #[serde(default = "default_access_key_prefixes")]
    pub access_key_prefixes: Vec<String>,

    #[serde(default = "default_guest_role")]
    pub default_role: String,

    #[serde(default)]
    pub default_permissions: Vec<String>,

    #[serde(default)]
    pub teams: BTreeMap<String, TeamRule>,
}

impl Default for CloudIamConfig {
    fn default() -> Self {
        Self {
            region: None,
            endpoint_url: None,
            team_tag_key: default_team_tag_key(),
            team_delimiter: default_team_delimiter(),
            organization: default_organization(),
            required_tag_key: None,
            required_tag_value: None,
            required_account_id: None,
            access_key_length: default_access_key_length(),
            access_key_prefixes: default_access_key_prefixes(),
            default_role: default_guest_role(),
            default_permissions: Vec::new(),
            teams: BTreeMap::new(),
        }
    }
}

impl CloudIamConfig {
    #[cfg_attr(not(feature = "cloud-iam"), allow(dead_code))]
    fn validate(&self) -> Result<(), ConfigError> {
        if self.access_key_prefixes.is_empty() {
            return Err(ConfigError::Validation(
                "auth.cloud_iam.access_key_prefixes cannot be empty".into(),
            ));
        }
        if self.access_key_length == 0 {
            return Err(ConfigError::Validation(
                "auth.cloud_iam.access_key_length must be greater than 0".into(),
            ));
        }
        if self.team_delimiter.is_empty() {
            return Err(ConfigError::Validation(
                "auth.cloud_iam.team_delimiter cannot be empty".into(),
            ));
        }
        if self.required_tag_value.is_some() && self.required_tag_key.is_none() {
            return Err(ConfigError::Validation(
                "auth.cloud_iam.required_tag_value needs required_tag_key".into(),
            ));
        }
        validate_team_rules("auth.cloud_iam", &self.teams)
    }

    pub fn team_mapping(&self) -> TeamMapping {
        TeamMapping::new(
            self.teams.clone(),
            self.default_role.clone(),
            self.default_permissions.clone(),
        )
    }
}

fn default_team_tag_key() -> String {
    "Team".to_string()
}

fn default_team_delimiter() -> String {
    ",".to_string()
}

fn default_organization() -> String {
    "aws".to_string()
}

fn default_access_key_length() -> usize {
    20
}

fn default_access_key_prefixes() -> Vec<String> {
    vec!["AKIA".to_string(), "ASIA".to_string()]
}

fn default_true() -> bool {
    true
}
