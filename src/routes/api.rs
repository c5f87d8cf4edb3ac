//! Authenticated API routes consumed by the session router.

use axum::{Extension, Json, extract::Query};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{AuthError, AuthenticatedRequest},
    authz::{AuthorizationContext, ResourceScope, permissions},
};

/// The caller's identity and capability view.
pub async fn me(Extension(auth): Extension<AuthenticatedRequest>) -> Json<AuthorizationContext> {
    Json(auth.context)
}

#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    /// Subject that owns the resource
    pub owner: String,
    #[serde(default)]
    pub scope: ResourceScope,
    /// Team the resource belongs to, for team-scoped resources
    pub team: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub allowed: bool,
}

/// Check whether the caller may access a session owned by someone.
pub async fn access(
    Extension(auth): Extension<AuthenticatedRequest>,
    Query(query): Query<AccessQuery>,
) -> Result<Json<AccessResponse>, AuthError> {
    auth.context.require_permission(permissions::SESSION_READ)?;
    let allowed =
        auth.context
            .can_access_resource(&query.owner, query.scope, query.team.as_deref());
    tracing::debug!(
        subject = %auth.identity().subject_id,
        owner = %query.owner,
        scope = %query.scope,
        allowed,
        "Resource access check"
    );
    Ok(Json(AccessResponse { allowed }))
}
