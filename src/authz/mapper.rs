use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::PathBuf,
};

use serde::{Deserialize, Serialize};

use super::match_team_pattern;

/// One `(organization, team)` membership reported by an identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupMembership {
    pub organization: String,
    pub team_slug: String,
    /// Role inside the team as reported by the provider (e.g. `member`, `maintainer`).
    pub external_role: String,
}

impl GroupMembership {
    pub fn new(
        organization: impl Into<String>,
        team_slug: impl Into<String>,
        external_role: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            team_slug: team_slug.into(),
            external_role: external_role.into(),
        }
    }

    /// Team identifier in `org/team` form.
    pub fn team_id(&self) -> String {
        format!("{}/{}", self.organization, self.team_slug)
    }
}

/// A configured mapping from an `org/team` pattern to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TeamRule {
    /// Role granted to members of matching teams.
    pub role: String,

    /// Permissions granted to members of matching teams.
    #[serde(default)]
    pub permissions: Vec<String>,

    /// Environment file handed to the backend when this rule wins the role.
    #[serde(default)]
    pub env_file: Option<PathBuf>,
}

/// Role ranking used to pick one winner among several matched rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePriority(HashMap<String, i32>);

impl RolePriority {
    pub fn new(ranks: HashMap<String, i32>) -> Self {
        Self(ranks)
    }

    pub fn rank(&self, role: &str) -> Option<i32> {
        self.0.get(role).copied()
    }

    /// True only if both roles are ranked and `candidate` ranks strictly higher.
    pub fn outranks(&self, candidate: &str, current: &str) -> bool {
        match (self.rank(candidate), self.rank(current)) {
            (Some(candidate), Some(current)) => candidate > current,
            _ => false,
        }
    }
}

impl Default for RolePriority {
    fn default() -> Self {
        Self(
            [("admin", 100), ("developer", 50), ("user", 10), ("guest", 0)]
                .into_iter()
                .map(|(role, rank)| (role.to_string(), rank))
                .collect(),
        )
    }
}

/// Outcome of mapping memberships through the team rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleResolution {
    pub role: String,
    pub permissions: BTreeSet<String>,
    pub env_file: Option<PathBuf>,
}

/// Team rule table plus the provider defaults it starts from.
#[derive(Debug, Clone, Default)]
pub struct TeamMapping {
    rules: BTreeMap<String, TeamRule>,
    default_role: String,
    default_permissions: Vec<String>,
}

impl TeamMapping {
    pub fn new(
        rules: BTreeMap<String, TeamRule>,
        default_role: impl Into<String>,
        default_permissions: Vec<String>,
    ) -> Self {
        Self {
            rules,
            default_role: default_role.into(),
            default_permissions,
        }
    }

    /// `(org, team)` pairs named literally (no `*`) by the rule keys.
    pub fn literal_pairs(&self) -> BTreeSet<(String, String)> {
        self.rules
            .keys()
            .filter(|key| !key.contains('*'))
            .filter_map(|key| key.split_once('/'))
            .filter(|(_, team)| !team.contains('/'))
            .map(|(org, team)| (org.to_string(), team.to_string()))
            .collect()
    }

    /// Organization halves of every well-formed rule key.
    pub fn organizations(&self) -> BTreeSet<String> {
        self.rules
            .keys()
            .filter_map(|key| key.split_once('/'))
            .map(|(org, _)| org.to_string())
            .collect()
    }

    pub fn has_wildcard_rules(&self) -> bool {
        self.rules.keys().any(|key| key.contains('*'))
    }

    /// Whether any rule key matches the given membership.
    pub fn matches_any(&self, org: &str, team_slug: &str) -> bool {
        self.rules
            .keys()
            .any(|pattern| match_team_pattern(pattern, org, team_slug))
    }

    /// Resolve memberships into a single role, a merged permission set and
    /// an optional environment file.
    ///
    /// Every matched rule contributes its permissions (set union, so duplicate
    /// memberships or rules are harmless). The role only moves when a matched
    /// rule's role strictly outranks the current one; roles missing from
    /// `priority` never upgrade nor demote. `env_file` is taken from the rule
    /// that performed the most recent upgrade; ties keep what is already set.
    pub fn resolve(
        &self,
        memberships: &[GroupMembership],
        priority: &RolePriority,
    ) -> RoleResolution {
        let mut role = self.default_role.clone();
        let mut permissions: BTreeSet<String> = self.default_permissions.iter().cloned().collect();
        let mut env_file = None;

        for (pattern, rule) in &self.rules {
            let matched = memberships
                .iter()
                .any(|m| match_team_pattern(pattern, &m.organization, &m.team_slug));
            if !matched {
                continue;
            }

            permissions.extend(rule.permissions.iter().cloned());

            // Unranked roles neither promote nor demote
            if priority.outranks(&rule.role, &role) {
                tracing::debug!(
                    pattern = %pattern,
                    from = %role,
                    to = %rule.role,
                    "Team rule upgraded role"
                );
                role = rule.role.clone();
                if let Some(path) = rule.env_file.as_ref().filter(|p| !p.as_os_str().is_empty()) {
                    env_file = Some(path.clone());
                }
            }
        }

        RoleResolution {
            role,
            permissions,
            env_file,
        }
    }
}
