use std::collections::BTreeMap;

use subtle::ConstantTimeEq;

use super::{AuthError, AuthType, Identity};
use crate::config::{StaticKeyEntry, StaticKeysConfig};

/// Authenticates callers against a fixed table of API keys.
///
/// Every entry is compared in constant time and the scan never stops early,
/// so response timing does not depend on which key (if any) matched.
#[derive(Debug, Clone)]
pub struct StaticKeyAuthenticator {
    entries: Vec<(Vec<u8>, StaticKeyEntry)>,
}

impl StaticKeyAuthenticator {
    pub fn new(config: &StaticKeysConfig) -> Self {
        Self {
            entries: config
                .keys
                .iter()
                .map(|(key, entry)| (key.as_bytes().to_vec(), entry.clone()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[tracing::instrument(skip_all, fields(provider = "static_key"))]
    pub fn authenticate(&self, key: &str) -> Result<Identity, AuthError> {
        let presented = key.as_bytes();
        let mut matched: Option<&StaticKeyEntry> = None;
        for (candidate, entry) in &self.entries {
            if bool::from(candidate.as_slice().ct_eq(presented)) {
                matched = Some(entry);
            }
        }

        let entry = matched.ok_or(AuthError::InvalidCredential)?;
        tracing::debug!(subject = %entry.subject, role = %entry.role, "Static key accepted");

        Ok(Identity {
            subject_id: entry.subject.clone(),
            role: entry.role.clone(),
            permissions: entry.permissions.iter().cloned().collect(),
            auth_type: AuthType::ApiKey,
            env_file: None,
            teams: entry.team.iter().cloned().collect(),
            metadata: BTreeMap::new(),
            access_token: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn authenticator() -> StaticKeyAuthenticator {
        let keys = HashMap::from([
            (
                "sk-admin".to_string(),
                StaticKeyEntry {
                    subject: "ops".into(),
                    role: "admin".into(),
                    permissions: vec!["*".into()],
                    team: None,
                },
            ),
            (
                "sk-ci".to_string(),
                StaticKeyEntry {
                    subject: "ci-bot".into(),
                    role: "user".into(),
                    permissions: vec!["session:create".into(), "session:read".into()],
                    team: Some("acme/platform".into()),
                },
            ),
        ]);
        StaticKeyAuthenticator::new(&StaticKeysConfig { keys })
    }

    #[test]
    fn test_known_key_returns_entry_verbatim() {
        let identity = authenticator().authenticate("sk-ci").unwrap();
        assert_eq!(identity.subject_id, "ci-bot");
        assert_eq!(identity.role, "user");
        assert_eq!(identity.auth_type, AuthType::ApiKey);
        assert!(identity.has_permission("session:create"));
        assert!(!identity.has_permission("session:delete"));
        assert_eq!(identity.teams, vec!["acme/platform"]);
    }

    #[test]
    fn test_key_without_team_has_no_teams() {
        let identity = authenticator().authenticate("sk-admin").unwrap();
        assert!(identity.teams.is_empty());
        assert!(identity.has_permission("anything"));
    }

    #[test]
    fn test_unknown_key() {
        let auth = authenticator();
        for key in ["sk-unknown", "sk-ci ", "SK-CI", "sk-c", ""] {
            assert!(
                matches!(auth.authenticate(key), Err(AuthError::InvalidCredential)),
                "key {key:?} should be rejected"
            );
        }
    }
}
