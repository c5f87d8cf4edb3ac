//! Authorization: turning external group memberships into roles and
//! permissions, and expanding an authenticated identity into the capability
//! view consumed by request handlers.
//!
//! The flow:
//! 1. An authenticator resolves the caller's `(organization, team)` memberships
//! 2. [`TeamMapping::resolve`] matches them against the configured team rules
//!    (keys are `"<org-pattern>/<team-pattern>"`) and picks the winning role
//! 3. [`AuthorizationContext::build`] derives personal and team scopes from
//!    the resulting identity

mod context;
mod mapper;

pub use context::{
    AuthorizationContext, CrudFlags, PERMISSION_ALL, ResourceScope, TeamScope, has_permission,
    permissions,
};
pub use mapper::{GroupMembership, RolePriority, RoleResolution, TeamMapping, TeamRule};

/// Match a single pattern segment against a value.
///
/// Supports four matching modes:
/// - `*` matches any value, including the empty string (full wildcard)
/// - `foo-*` matches any value starting with `foo-` (prefix wildcard)
/// - `*-foo` matches any value ending with `-foo` (suffix wildcard)
/// - `foo` matches only the exact string `foo` (exact match)
///
/// The literal part of a prefix/suffix pattern keeps its separator, so
/// `backend-*` does not match `backend`.
///
/// # Examples
///
/// ```
/// use sessiongate::authz::match_segment;
///
/// assert!(match_segment("*", ""));
/// assert!(match_segment("backend-*", "backend-team"));
/// assert!(!match_segment("backend-*", "backend"));
/// assert!(match_segment("*-engineer", "frontend-engineer"));
/// assert!(!match_segment("*-engineer", "engineer"));
/// ```
pub fn match_segment(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if pattern.len() > 1 {
        if let Some(prefix) = pattern.strip_suffix('*') {
            return value.starts_with(prefix);
        }
        if let Some(suffix) = pattern.strip_prefix('*') {
            return value.ends_with(suffix);
        }
    }
    pattern == value
}

/// Match a `"<org-pattern>/<team-pattern>"` rule key against a membership.
///
/// Keys with zero or more than one `/` never match.
pub fn match_team_pattern(pattern: &str, org: &str, team_slug: &str) -> bool {
    let mut parts = pattern.split('/');
    let (Some(org_pattern), Some(team_pattern), None) = (parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    match_segment(org_pattern, org) && match_segment(team_pattern, team_slug)
}

/// Whether a rule key has the `org/team` shape at all.
pub fn is_valid_team_pattern(pattern: &str) -> bool {
    pattern.matches('/').count() == 1
}
