//! Configuration module for the session gate.
//!
//! The gate is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [auth.github]
//! default_role = "guest"
//!
//! [auth.github.teams."acme/platform-*"]
//! role = "developer"
//! permissions = ["session:create", "session:read"]
//!
//! [auth.github.oauth]
//! client_id = "Iv1.0123456789"
//! client_secret = "${GITHUB_CLIENT_SECRET}"
//! ```

mod auth;
mod observability;
mod server;

use std::{path::Path, sync::LazyLock};

pub use auth::*;
pub use observability::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
pub use server::*;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication providers and authorization settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Observability configuration (logging, metrics).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: GatewayConfig = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.request_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "server.request_timeout_secs must be greater than 0".into(),
            ));
        }
        self.auth.validate()
    }

    /// Names of the providers enabled by this configuration, in gate order.
    pub fn enabled_providers(&self) -> Vec<&'static str> {
        let mut providers = Vec::new();
        if self.auth.static_keys.is_some() {
            providers.push("static_key");
        }
        if let Some(github) = &self.auth.github {
            if github.token_auth {
                providers.push("github_token");
            }
            if github.oauth.is_some() {
                providers.push("github_oauth");
            }
        }
        if self.auth.cloud_iam.is_some() {
            providers.push("cloud_iam");
        }
        providers
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

static ENV_VAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex is valid"));

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in ENV_VAR.captures_iter(line) {
            let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };

            // Skip if this variable is inside a comment
            if comment_pos.is_some_and(|pos| whole.start() >= pos) {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = name.as_str();
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config() {
        let config = GatewayConfig::from_str(
            r#"
            [auth.static_keys.keys.sk-test]
            subject = "ci-bot"
            role = "user"
            permissions = ["session:read"]
        "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.enabled_providers(), vec!["static_key"]);
    }

    #[test]
    fn test_full_config() {
        let config = GatewayConfig::from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 9000
            request_timeout_secs = 5

            [auth]
            cache_ttl_secs = 60
            admin_roles = ["admin", "owner"]

            [auth.role_priority]
            owner = 200
            admin = 100
            guest = 0

            [auth.github]
            api_base = "https://github.example.com/api/v3"

            [auth.github.teams."acme/eng"]
            role = "admin"

            [auth.github.oauth]
            client_id = "id"
            client_secret = "secret"
            redirect_uri = "https://gate.example.com/oauth/callback"

            [observability.logging]
            format = "json"
            level = "debug"
        "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.request_timeout().as_secs(), 5);
        assert_eq!(config.auth.role_priority.len(), 3);
        assert_eq!(config.observability.logging.format, LogFormat::Json);
        assert_eq!(
            config.enabled_providers(),
            vec!["github_token", "github_oauth"]
        );
    }

    #[test]
    fn test_unknown_section_rejected() {
        let result = GatewayConfig::from_str(
            r#"
            [database]
            url = "postgres://localhost"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_env_var_is_error() {
        temp_env::with_var_unset("SESSIONGATE_TEST_UNSET", || {
            let result = GatewayConfig::from_str(
                r#"
                [auth.static_keys.keys."${SESSIONGATE_TEST_UNSET}"]
                subject = "ci"
                role = "user"
            "#,
            );
            assert!(matches!(result, Err(ConfigError::EnvVarNotFound(v)) if v == "SESSIONGATE_TEST_UNSET"));
        });
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("TEST_CLIENT_SECRET", Some("s3cret"), || {
            let result = expand_env_vars("client_secret = \"${TEST_CLIENT_SECRET}\"").unwrap();
            assert_eq!(result, "client_secret = \"s3cret\"");
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# client_secret = \"${NONEXISTENT_VAR}\"").unwrap();
        assert_eq!(result, "# client_secret = \"${NONEXISTENT_VAR}\"");
    }

    #[test]
    fn test_env_var_after_comment_ignored() {
        let result = expand_env_vars("key = \"value\" # ${NONEXISTENT_VAR}").unwrap();
        assert_eq!(result, "key = \"value\" # ${NONEXISTENT_VAR}");
    }

    #[test]
    fn test_multiline_with_comments() {
        temp_env::with_var("TEST_MULTI", Some("value1"), || {
            let input = r#"key1 = "${TEST_MULTI}"
# key2 = "${NONEXISTENT}"
key3 = "literal""#;
            let result = expand_env_vars(input).unwrap();
            assert_eq!(
                result,
                r#"key1 = "value1"
# key2 = "${NONEXISTENT}"
key3 = "literal""#
            );
        });
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = GatewayConfig::from_str(
            r#"
            [server]
            request_timeout_secs = 0

            [auth.static_keys.keys.k]
            subject = "s"
            role = "user"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
