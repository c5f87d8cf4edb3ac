use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::observability::metrics;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No authentication credentials provided
    #[error("Authentication credentials required")]
    MissingCredentials,

    /// Credentials were provided but no provider accepted them
    #[error("Authentication failed")]
    Unauthenticated,

    /// Key not present in the static key table
    #[error("Invalid credential")]
    InvalidCredential,

    /// Malformed header or key shape
    #[error("Invalid credential format: {0}")]
    InvalidCredentialFormat(String),

    /// External identity provider call failed or timed out
    #[error("Identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// OAuth state unknown or already consumed
    #[error("Invalid or already used OAuth state")]
    InvalidState,

    /// OAuth state older than the handshake window
    #[error("OAuth state has expired")]
    ExpiredState,

    /// Authenticated but lacking the required permission
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Malformed request to one of the auth endpoints
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Requested feature is not configured on this gate
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    /// Internal error during authentication
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable machine-readable code used in error bodies and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingCredentials => "missing_credentials",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::InvalidCredential => "invalid_credential",
            AuthError::InvalidCredentialFormat(_) => "invalid_credential_format",
            AuthError::ProviderUnavailable(_) => "provider_unavailable",
            AuthError::InvalidState => "invalid_state",
            AuthError::ExpiredState => "expired_state",
            AuthError::Forbidden(_) => "forbidden",
            AuthError::InvalidRequest(_) => "invalid_request",
            AuthError::NotConfigured(_) => "not_configured",
            AuthError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::MissingCredentials
            | AuthError::Unauthenticated
            | AuthError::InvalidCredential
            | AuthError::InvalidCredentialFormat(_) => StatusCode::UNAUTHORIZED,
            AuthError::InvalidState | AuthError::ExpiredState | AuthError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AuthError::Forbidden(_) => StatusCode::FORBIDDEN,
            AuthError::NotConfigured(_) => StatusCode::NOT_FOUND,
            AuthError::ProviderUnavailable(_) => StatusCode::BAD_GATEWAY,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error body: `{"error": {"type", "code", "message"}}`
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "type")]
    pub error_type: &'static str,
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_type = match status {
            StatusCode::FORBIDDEN => "permission_error",
            StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => "invalid_request_error",
            StatusCode::UNAUTHORIZED => "authentication_error",
            _ => "server_error",
        };
        // Upstream and internal details stay in the logs
        let message = match &self {
            AuthError::ProviderUnavailable(_) => "Identity provider unavailable".to_string(),
            AuthError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        };

        metrics::record_auth_failure(self.code());

        let body = ErrorResponse {
            error: ErrorBody {
                error_type,
                code: self.code(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    #[test]
    fn test_missing_credentials_is_401() {
        let response = AuthError::MissingCredentials.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_forbidden_is_distinct_from_unauthenticated() {
        assert_eq!(
            AuthError::Forbidden("session:read".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AuthError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_state_errors_are_400() {
        assert_eq!(AuthError::InvalidState.status(), StatusCode::BAD_REQUEST);
        assert_eq!(AuthError::ExpiredState.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_provider_details_not_exposed() {
        let response =
            AuthError::ProviderUnavailable("connect to 10.0.0.5:443 refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "provider_unavailable");
        assert!(!json["error"]["message"].as_str().unwrap().contains("10.0.0.5"));
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = AuthError::Unauthenticated.into_response();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "authentication_error");
        assert_eq!(json["error"]["code"], "unauthenticated");
        assert_eq!(json["error"]["message"], "Authentication failed");
    }
}
