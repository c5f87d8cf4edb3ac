use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, Identity};

/// Sentinel permission granting everything.
pub const PERMISSION_ALL: &str = "*";

/// Permission names checked by the CRUD flags.
pub mod permissions {
    pub const SESSION_CREATE: &str = "session:create";
    pub const SESSION_READ: &str = "session:read";
    pub const SESSION_UPDATE: &str = "session:update";
    pub const SESSION_DELETE: &str = "session:delete";
}

/// True iff `required` is present verbatim or the set holds [`PERMISSION_ALL`].
pub fn has_permission(granted: &BTreeSet<String>, required: &str) -> bool {
    granted.contains(PERMISSION_ALL) || granted.contains(required)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrudFlags {
    pub can_create: bool,
    pub can_read: bool,
    pub can_update: bool,
    pub can_delete: bool,
}

impl CrudFlags {
    pub fn from_permissions(granted: &BTreeSet<String>) -> Self {
        Self {
            can_create: has_permission(granted, permissions::SESSION_CREATE),
            can_read: has_permission(granted, permissions::SESSION_READ),
            can_update: has_permission(granted, permissions::SESSION_UPDATE),
            can_delete: has_permission(granted, permissions::SESSION_DELETE),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TeamScope {
    /// Team identifiers (`org/team`) the identity belongs to
    pub teams: Vec<String>,
    pub per_team: BTreeMap<String, CrudFlags>,
    pub is_admin: bool,
}

/// Scope a resource is owned under.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceScope {
    #[default]
    Personal,
    Team,
}

impl fmt::Display for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceScope::Personal => f.write_str("personal"),
            ResourceScope::Team => f.write_str("team"),
        }
    }
}

impl FromStr for ResourceScope {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "personal" => Ok(ResourceScope::Personal),
            "team" => Ok(ResourceScope::Team),
            other => Err(AuthError::InvalidRequest(format!(
                "unknown scope '{other}', expected 'personal' or 'team'"
            ))),
        }
    }
}

/// Capability view of an authenticated identity, built once per request.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationContext {
    pub identity: Identity,
    pub personal: CrudFlags,
    pub team: TeamScope,
}

impl AuthorizationContext {
    /// Expand an identity into personal and team scopes.
    ///
    /// The identity is an administrator when it holds `*` or its role is one
    /// of `admin_roles`. Every team gets the personal flags; there is no
    /// per-team role yet.
    pub fn build(identity: Identity, admin_roles: &[String]) -> Self {
        let personal = CrudFlags::from_permissions(&identity.permissions);
        let is_admin = identity.permissions.contains(PERMISSION_ALL)
            || admin_roles.iter().any(|r| *r == identity.role);

        let per_team = identity
            .teams
            .iter()
            .map(|team| (team.clone(), personal))
            .collect();

        Self {
            team: TeamScope {
                teams: identity.teams.clone(),
                per_team,
                is_admin,
            },
            personal,
            identity,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.team.is_admin
    }

    pub fn has_permission(&self, required: &str) -> bool {
        self.identity.has_permission(required)
    }

    /// Fail with [`AuthError::Forbidden`] unless the permission is held.
    pub fn require_permission(&self, required: &str) -> Result<(), AuthError> {
        if self.has_permission(required) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(format!(
                "missing required permission '{required}'"
            )))
        }
    }

    /// Ownership check used by session handlers.
    ///
    /// Admins may access anything. Team-scoped resources require membership
    /// of `team_id`; personal resources require the caller to be the owner.
    pub fn can_access_resource(
        &self,
        owner_id: &str,
        scope: ResourceScope,
        team_id: Option<&str>,
    ) -> bool {
        if self.is_admin() {
            return true;
        }
        match scope {
            ResourceScope::Team => {
                team_id.is_some_and(|id| self.team.teams.iter().any(|t| t == id))
            }
            ResourceScope::Personal => self.identity.subject_id == owner_id,
        }
    }
}
