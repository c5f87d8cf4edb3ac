//! Access-key authentication backed by AWS IAM.
//!
//! The caller presents an access key ID as the Basic-auth username. The gate
//! resolves the owning IAM user with its own credentials (IAM + STS lookups),
//! reads the user's team tag and maps it through the team rules. The caller's
//! secret is not verified here: whoever can reach the gate is trusted to have
//! been authenticated upstream.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;

use super::{AuthError, AuthType, Identity};
use crate::{
    authz::{GroupMembership, RolePriority, TeamMapping},
    cache::{CacheKeys, TtlCache},
    config::CloudIamConfig,
};

/// IAM user behind an access key.
#[derive(Debug, Clone, Default)]
pub struct IamPrincipal {
    pub user_name: String,
    pub arn: Option<String>,
    pub account_id: Option<String>,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum IamLookupError {
    #[error("access key is not known to IAM")]
    UnknownAccessKey,

    #[error("IAM request failed: {0}")]
    Request(String),
}

/// Administrative lookups used to resolve an access key.
#[async_trait]
pub trait IamDirectory: Send + Sync {
    async fn lookup_access_key(&self, access_key_id: &str) -> Result<IamPrincipal, IamLookupError>;
}

/// [`IamDirectory`] backed by the AWS SDK.
#[cfg(feature = "cloud-iam")]
pub struct AwsIamDirectory {
    iam: aws_sdk_iam::Client,
    sts: aws_sdk_sts::Client,
}

#[cfg(feature = "cloud-iam")]
impl AwsIamDirectory {
    /// Create IAM and STS clients from the default credential chain.
    pub async fn new(config: &CloudIamConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = &config.region {
            loader = loader.region(aws_config::Region::new(region.clone()));
        }
        let sdk_config = loader.load().await;

        let mut iam_config = aws_sdk_iam::config::Builder::from(&sdk_config);
        let mut sts_config = aws_sdk_sts::config::Builder::from(&sdk_config);
        if let Some(endpoint_url) = &config.endpoint_url {
            iam_config = iam_config.endpoint_url(endpoint_url);
            sts_config = sts_config.endpoint_url(endpoint_url);
        }

        Self {
            iam: aws_sdk_iam::Client::from_conf(iam_config.build()),
            sts: aws_sdk_sts::Client::from_conf(sts_config.build()),
        }
    }
}

#[cfg(feature = "cloud-iam")]
#[async_trait]
impl IamDirectory for AwsIamDirectory {
    async fn lookup_access_key(&self, access_key_id: &str) -> Result<IamPrincipal, IamLookupError> {
        use aws_sdk_iam::error::DisplayErrorContext;

        use crate::observability::metrics;

        let last_used = self
            .iam
            .get_access_key_last_used()
            .access_key_id(access_key_id)
            .send()
            .await
            .map_err(|e| {
                metrics::record_provider_request("cloud_iam", "get_access_key_last_used", "error");
                IamLookupError::Request(DisplayErrorContext(&e).to_string())
            })?;
        metrics::record_provider_request("cloud_iam", "get_access_key_last_used", "200");

        let user_name = last_used
            .user_name()
            .filter(|name| !name.is_empty())
            .ok_or(IamLookupError::UnknownAccessKey)?
            .to_string();

        let tags = self
            .iam
            .list_user_tags()
            .user_name(&user_name)
            .send()
            .await
            .map_err(|e| {
                metrics::record_provider_request("cloud_iam", "list_user_tags", "error");
                let service_error = e.into_service_error();
                if service_error.is_no_such_entity_exception() {
                    IamLookupError::UnknownAccessKey
                } else {
                    IamLookupError::Request(DisplayErrorContext(&service_error).to_string())
                }
            })?;
        metrics::record_provider_request("cloud_iam", "list_user_tags", "200");

        let tags = tags
            .tags()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect();

        // The ARN and account are informational; a failure here does not
        // block authentication.
        let arn = match self.iam.get_user().user_name(&user_name).send().await {
            Ok(output) => output.user().map(|user| user.arn().to_string()),
            Err(e) => {
                tracing::debug!(error = %DisplayErrorContext(&e), "IAM get_user failed");
                None
            }
        };

        let account_id = match self
            .sts
            .get_access_key_info()
            .access_key_id(access_key_id)
            .send()
            .await
        {
            Ok(output) => output.account().map(str::to_string),
            Err(e) => {
                tracing::debug!(
                    error = %aws_sdk_sts::error::DisplayErrorContext(&e),
                    "STS get_access_key_info failed"
                );
                None
            }
        };

        Ok(IamPrincipal {
            user_name,
            arn,
            account_id,
            tags,
        })
    }
}

/// Authenticates Basic-auth credentials whose username is an access key ID.
pub struct CloudIamAuthenticator {
    config: CloudIamConfig,
    directory: Arc<dyn IamDirectory>,
    mapping: TeamMapping,
    role_priority: Arc<RolePriority>,
    timeout: Duration,
    cache: TtlCache<String, Identity>,
}

impl CloudIamAuthenticator {
    pub fn new(
        config: &CloudIamConfig,
        directory: Arc<dyn IamDirectory>,
        role_priority: Arc<RolePriority>,
        cache_ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            mapping: config.team_mapping(),
            config: config.clone(),
            directory,
            role_priority,
            timeout,
            cache: TtlCache::new("cloud_iam", cache_ttl),
        }
    }

    /// Whether `candidate` has the shape of an access key ID.
    pub fn is_access_key_id(&self, candidate: &str) -> bool {
        candidate.len() == self.config.access_key_length
            && self
                .config
                .access_key_prefixes
                .iter()
                .any(|prefix| candidate.starts_with(prefix.as_str()))
            && candidate
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
    }

    #[tracing::instrument(skip_all, fields(provider = "cloud_iam"))]
    pub async fn authenticate(&self, access_key_id: &str) -> Result<Identity, AuthError> {
        if !self.is_access_key_id(access_key_id) {
            return Err(AuthError::InvalidCredentialFormat(
                "username is not an access key ID".into(),
            ));
        }

        let cache_key = CacheKeys::access_key(access_key_id);
        if let Some(identity) = self.cache.get(&cache_key) {
            return Ok(identity);
        }

        let principal = tokio::time::timeout(
            self.timeout,
            self.directory.lookup_access_key(access_key_id),
        )
        .await
        .map_err(|_| AuthError::ProviderUnavailable("IAM lookup timed out".into()))?
        .map_err(|e| match e {
            IamLookupError::UnknownAccessKey => AuthError::Unauthenticated,
            IamLookupError::Request(msg) => {
                tracing::warn!(error = %msg, "IAM lookup failed");
                AuthError::ProviderUnavailable(msg)
            }
        })?;

        self.check_requirements(&principal)?;

        let memberships = self.team_memberships(&principal);
        let resolution = self.mapping.resolve(&memberships, &self.role_priority);
        let mut teams: Vec<String> = memberships.iter().map(GroupMembership::team_id).collect();
        teams.sort();
        teams.dedup();

        let mut identity =
            Identity::from_resolution(&principal.user_name, AuthType::CloudIam, resolution, teams)
                .with_metadata("user_name", &principal.user_name);
        if let Some(account_id) = &principal.account_id {
            identity = identity.with_metadata("account_id", account_id);
        }
        if let Some(arn) = &principal.arn {
            identity = identity.with_metadata("arn", arn);
        }

        tracing::info!(
            subject = %identity.subject_id,
            role = %identity.role,
            teams = identity.teams.len(),
            "IAM access key authenticated"
        );

        self.cache.set(cache_key, identity.clone());
        Ok(identity)
    }

    fn check_requirements(&self, principal: &IamPrincipal) -> Result<(), AuthError> {
        if let Some(required) = &self.config.required_account_id
            && principal.account_id.as_deref() != Some(required.as_str())
        {
            tracing::warn!(
                user = %principal.user_name,
                account = ?principal.account_id,
                "IAM principal is not in the required account"
            );
            return Err(AuthError::Unauthenticated);
        }

        if let Some(key) = &self.config.required_tag_key {
            let satisfied = match (principal.tags.get(key), &self.config.required_tag_value) {
                (None, _) => false,
                (Some(_), None) => true,
                (Some(actual), Some(expected)) => actual == expected,
            };
            if !satisfied {
                tracing::warn!(
                    user = %principal.user_name,
                    tag = %key,
                    "IAM principal is missing the required tag"
                );
                return Err(AuthError::Unauthenticated);
            }
        }
        Ok(())
    }

    /// Split the team tag into memberships. Values may be `team` (mapped
    /// under the configured organization) or `org/team`.
    fn team_memberships(&self, principal: &IamPrincipal) -> Vec<GroupMembership> {
        let Some(raw) = principal.tags.get(&self.config.team_tag_key) else {
            return Vec::new();
        };
        raw.split(self.config.team_delimiter.as_str())
            .map(str::trim)
            .filter(|team| !team.is_empty())
            .map(|team| match team.split_once('/') {
                Some((org, slug)) => GroupMembership::new(org, slug, "member"),
                None => GroupMembership::new(&self.config.organization, team, "member"),
            })
            .collect()
    }
}
