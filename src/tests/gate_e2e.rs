use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

use crate::{AppState, build_app, config::GatewayConfig};

const STATIC_KEYS: &str = r#"
[auth]
cache_ttl_secs = 0

[auth.static_keys.keys.sk-reader]
subject = "alice"
role = "user"
permissions = ["session:read"]
team = "acme/eng"

[auth.static_keys.keys.sk-writer]
subject = "bob"
role = "user"
permissions = ["session:create"]

[auth.static_keys.keys.sk-admin]
subject = "ops"
role = "admin"
permissions = ["*"]
"#;

async fn app(toml: &str) -> Router {
    let config = GatewayConfig::from_str(toml).unwrap();
    build_app(AppState::new(config).await.unwrap())
}

async fn get(app: &Router, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, Value) {
    let mut builder = Request::builder().method("GET").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let response = app
        .clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn test_health_is_exempt() {
    let app = app(STATIC_KEYS).await;
    let (status, body) = get(&app, "/health", &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"status": "ok"}));
}

#[tokio::test]
async fn test_health_lookalike_paths_are_gated() {
    let app = app(STATIC_KEYS).await;
    for path in ["/healthz", "/health-admin", "/metricsx"] {
        let (status, body) = get(&app, path, &[]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{path}");
        assert_eq!(body["error"]["code"], "missing_credentials");
    }
}

#[tokio::test]
async fn test_missing_credentials() {
    let app = app(STATIC_KEYS).await;
    let (status, body) = get(&app, "/api/me", &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "missing_credentials");
}

#[tokio::test]
async fn test_unknown_key_is_generic_unauthenticated() {
    let app = app(STATIC_KEYS).await;
    let (status, body) = get(&app, "/api/me", &[("x-api-key", "sk-nope")]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthenticated");
}

#[tokio::test]
async fn test_me_returns_context() {
    let app = app(STATIC_KEYS).await;
    let (status, body) = get(&app, "/api/me", &[("X-API-Key", "sk-reader")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identity"]["subject_id"], "alice");
    assert_eq!(body["identity"]["auth_type"], "api_key");
    assert_eq!(body["personal"]["can_read"], true);
    assert_eq!(body["personal"]["can_create"], false);
    assert_eq!(body["team"]["teams"][0], "acme/eng");
    assert_eq!(body["team"]["per_team"]["acme/eng"]["can_read"], true);
    assert_eq!(body["team"]["is_admin"], false);
}

#[tokio::test]
async fn test_access_check() {
    let app = app(STATIC_KEYS).await;
    let reader = [("x-api-key", "sk-reader")];

    let (status, body) = get(&app, "/api/access?owner=alice", &reader).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);

    let (_, body) = get(&app, "/api/access?owner=carol", &reader).await;
    assert_eq!(body["allowed"], false);

    let (_, body) = get(&app, "/api/access?owner=carol&scope=team&team=acme/eng", &reader).await;
    assert_eq!(body["allowed"], true);

    let (_, body) = get(&app, "/api/access?owner=carol&scope=team&team=acme/ops", &reader).await;
    assert_eq!(body["allowed"], false);
}

#[tokio::test]
async fn test_access_check_requires_read_permission() {
    let app = app(STATIC_KEYS).await;
    let (status, body) = get(&app, "/api/access?owner=bob", &[("x-api-key", "sk-writer")]).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");
}

#[tokio::test]
async fn test_admin_can_access_anything() {
    let app = app(STATIC_KEYS).await;
    let (status, body) = get(
        &app,
        "/api/access?owner=someone&scope=team&team=other/team",
        &[("x-api-key", "sk-admin")],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], true);
}

#[tokio::test]
async fn test_malformed_basic_auth_rejected() {
    let app = app(STATIC_KEYS).await;
    let (status, body) = get(&app, "/api/me", &[("authorization", "Basic %%%")]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "invalid_credential_format");
}

#[tokio::test]
async fn test_oauth_not_configured() {
    let app = app(STATIC_KEYS).await;
    let (status, body) = get(&app, "/oauth/authorize", &[]).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_configured");
}

fn github_config(api_base: &str) -> String {
    format!(
        r#"
[auth]
cache_ttl_secs = 0

[auth.github]
api_base = "{api_base}"
default_permissions = ["session:read"]

[auth.github.teams."acme/platform"]
role = "developer"
permissions = ["session:create"]

[auth.github.oauth]
client_id = "client-1"
client_secret = "secret-1"
redirect_uri = "https://gate.example.com/oauth/callback"
"#
    )
}

async fn mock_github(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/login/oauth/access_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "gho_from_code"})),
        )
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "login": "octocat",
            "id": 1
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/orgs/acme/teams/platform/memberships/octocat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"state": "active", "role": "member"})),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_github_bearer_token() {
    let server = MockServer::start().await;
    mock_github(&server).await;
    let app = app(&github_config(&server.uri())).await;

    let (status, body) = get(&app, "/api/me", &[("authorization", "Bearer gho_abc")]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["identity"]["subject_id"], "octocat");
    assert_eq!(body["identity"]["role"], "developer");
    assert_eq!(body["identity"]["auth_type"], "github");
    assert_eq!(body["personal"]["can_create"], true);
}

#[tokio::test]
async fn test_oauth_round_trip() {
    let server = MockServer::start().await;
    mock_github(&server).await;
    let app = app(&github_config(&server.uri())).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/oauth/authorize")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_redirection());
    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let location = url::Url::parse(location).unwrap();
    assert_eq!(location.path(), "/login/oauth/authorize");
    let state = location
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap();

    let callback = format!("/oauth/callback?code=abc&state={state}");
    let (status, body) = get(&app, &callback, &[]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subject"], "octocat");
    assert_eq!(body["role"], "developer");
    assert_eq!(body["access_token"], "gho_from_code");
    assert_eq!(body["teams"][0], "acme/platform");

    // Replaying the callback fails: the state is single-use
    let (status, body) = get(&app, &callback, &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_state");
}

#[tokio::test]
async fn test_oauth_callback_provider_error() {
    let server = MockServer::start().await;
    let app = app(&github_config(&server.uri())).await;
    let (status, _) = get(&app, "/oauth/callback?error=access_denied", &[]).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_oauth_callback_missing_params() {
    let server = MockServer::start().await;
    let app = app(&github_config(&server.uri())).await;
    let (status, body) = get(&app, "/oauth/callback?code=abc", &[]).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_request");
}

#[cfg(feature = "cloud-iam")]
#[tokio::test]
async fn test_basic_auth_with_non_access_key_username_declined() {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    let toml = format!(
        "{STATIC_KEYS}\n[auth.cloud_iam]\nregion = \"us-east-1\"\nendpoint_url = \"http://127.0.0.1:1\"\n"
    );
    let app = app(&toml).await;
    let encoded = STANDARD.encode("not-an-access-key:secret");
    let (status, body) = get(
        &app,
        "/api/me",
        &[("authorization", &format!("Basic {encoded}"))],
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "unauthenticated");
}
