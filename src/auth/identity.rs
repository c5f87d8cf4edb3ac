use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    path::PathBuf,
};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::authz::{AuthorizationContext, RoleResolution, has_permission};

/// Which provider produced an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    ApiKey,
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "oauth")]
    OAuth,
    CloudIam,
}

impl AuthType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthType::ApiKey => "api_key",
            AuthType::GitHub => "github",
            AuthType::OAuth => "oauth",
            AuthType::CloudIam => "cloud_iam",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The resolved, authenticated principal for one request.
#[derive(Clone, Serialize)]
pub struct Identity {
    /// Stable subject identifier (key subject, GitHub login, IAM user name)
    pub subject_id: String,

    /// Winning role after team rule resolution
    pub role: String,

    /// Provider defaults unioned with every matched rule's permissions
    pub permissions: BTreeSet<String>,

    pub auth_type: AuthType,

    /// Environment file selected by the rule that won the role
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env_file: Option<PathBuf>,

    /// Team identifiers (`org/team`) the subject belongs to
    pub teams: Vec<String>,

    /// Provider-specific details (login, account id, ...)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,

    /// Raw access token, only set for identities created by the OAuth handshake
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Identity {
    /// Build an identity from a team rule resolution.
    pub fn from_resolution(
        subject_id: impl Into<String>,
        auth_type: AuthType,
        resolution: RoleResolution,
        teams: Vec<String>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            role: resolution.role,
            permissions: resolution.permissions,
            auth_type,
            env_file: resolution.env_file,
            teams,
            metadata: BTreeMap::new(),
            access_token: None,
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn has_permission(&self, required: &str) -> bool {
        has_permission(&self.permissions, required)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject_id", &self.subject_id)
            .field("role", &self.role)
            .field("permissions", &self.permissions)
            .field("auth_type", &self.auth_type)
            .field("env_file", &self.env_file)
            .field("teams", &self.teams)
            .field("metadata", &self.metadata)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Extension type that gets added to requests after authentication
#[derive(Debug, Clone)]
pub struct AuthenticatedRequest {
    pub context: AuthorizationContext,
    pub authenticated_at: DateTime<Utc>,
}

impl AuthenticatedRequest {
    pub fn new(context: AuthorizationContext) -> Self {
        Self {
            context,
            authenticated_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.context.identity
    }
}
