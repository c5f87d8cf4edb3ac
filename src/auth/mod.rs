//! Authentication: turning request credentials into an [`Identity`].
//!
//! Supported providers:
//! - static API keys from the config file
//! - GitHub personal/OAuth access tokens, with team membership lookups
//! - the GitHub OAuth2 authorization-code handshake
//! - AWS IAM access keys presented through Basic auth
//!
//! [`AuthGate`] tries them in that order and wraps the first success in an
//! [`AuthenticatedRequest`].

mod cloud_iam;
mod credential;
mod error;
mod fanout;
mod gate;
mod github;
mod identity;
mod oauth;
mod static_key;

#[cfg(feature = "cloud-iam")]
pub use cloud_iam::AwsIamDirectory;
pub use cloud_iam::{CloudIamAuthenticator, IamDirectory, IamLookupError, IamPrincipal};
pub use credential::{Credential, extract_credentials};
pub use error::{AuthError, ErrorBody, ErrorResponse};
pub use fanout::bounded_parallel_map;
pub use gate::{AuthGate, Provider};
pub use github::GitHubTokenAuthenticator;
pub use identity::{AuthType, AuthenticatedRequest, Identity};
pub use oauth::{
    DEFAULT_STATE_TTL, GitHubOAuthAuthenticator, OAuthStateStore, PendingAuthorization,
    web_base_url,
};
pub use static_key::StaticKeyAuthenticator;
