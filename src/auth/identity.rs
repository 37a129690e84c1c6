use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::TtlCache;
use crate::error::Result;
use crate::provider::{IdentityProvider, ProviderError};
use crate::registry::normalize_scope;

const IDENTITY_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// A resolved caller. Authorization switches exhaustively on the variant:
/// user credentials may escalate into foreign scopes via organization
/// membership, installation credentials never do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    User {
        scope: String,
        user_id: i64,
        display_name: Option<String>,
    },
    Installation {
        scope: String,
        repositories: Vec<String>,
    },
}

impl Identity {
    #[must_use]
    pub fn scope(&self) -> &str {
        match self {
            Self::User { scope, .. } | Self::Installation { scope, .. } => scope,
        }
    }

    /// Numeric id under which this identity can hold capabilities in the
    /// permission store. Installations have none.
    #[must_use]
    pub fn permission_id(&self) -> Option<i64> {
        match self {
            Self::User { user_id, .. } => Some(*user_id),
            Self::Installation { .. } => None,
        }
    }
}

/// One-way fingerprint of a credential, used as a cache key so raw
/// credentials never sit in memory longer than the request.
#[must_use]
pub fn credential_fingerprint(credential: &str) -> String {
    hex::encode(Sha256::digest(credential.as_bytes()))
}

/// Turns a bearer credential into a typed [`Identity`] via the external
/// provider, with a short-TTL cache to bound provider traffic.
pub struct IdentityResolver {
    provider: Arc<dyn IdentityProvider>,
    cache: TtlCache<Identity>,
}

impl IdentityResolver {
    #[must_use]
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            cache: TtlCache::new(IDENTITY_CACHE_TTL),
        }
    }

    /// Resolves a credential, trying the personal interpretation first and
    /// the installation interpretation second. Returns `Ok(None)` when both
    /// are rejected; the caller surfaces that as an authentication failure.
    pub async fn resolve(&self, credential: &str) -> Result<Option<Identity>> {
        let fingerprint = credential_fingerprint(credential);
        if let Some(identity) = self.cache.get(&fingerprint) {
            return Ok(Some(identity));
        }

        if let Some(identity) = self.resolve_user(credential).await? {
            self.cache.insert(fingerprint, identity.clone());
            return Ok(Some(identity));
        }

        if let Some(identity) = self.resolve_installation(credential).await? {
            self.cache.insert(fingerprint, identity.clone());
            return Ok(Some(identity));
        }

        Ok(None)
    }

    async fn resolve_user(&self, credential: &str) -> Result<Option<Identity>> {
        match self.provider.current_account(credential).await {
            Ok(account) => Ok(Some(Identity::User {
                scope: normalize_scope(&account.login),
                user_id: account.id,
                display_name: account.name,
            })),
            Err(e) => {
                debug!("credential not usable as a user credential: {e}");
                Ok(None)
            }
        }
    }

    async fn resolve_installation(&self, credential: &str) -> Result<Option<Identity>> {
        let repositories = match self.provider.installation_repositories(credential).await {
            Ok(repositories) => repositories,
            Err(ProviderError::Http(e)) => {
                return Err(crate::error::Error::Provider(e));
            }
            Err(e) => {
                debug!("credential not usable as an installation credential: {e}");
                return Ok(None);
            }
        };

        let mut owners: Vec<&str> = Vec::new();
        for repo in &repositories {
            if !owners.contains(&repo.owner.login.as_str()) {
                owners.push(&repo.owner.login);
            }
        }

        let Some(owner) = owners.first() else {
            debug!("installation credential reaches no repositories");
            return Ok(None);
        };
        if owners.len() > 1 {
            warn!(
                "installation credential spans {} owners, using '{}'",
                owners.len(),
                owner
            );
        }

        Ok(Some(Identity::Installation {
            scope: normalize_scope(owner),
            repositories: repositories.iter().map(|r| r.name.clone()).collect(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{AccountInfo, OrgMembership, RepositoryInfo, RepositoryOwner};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct StubProvider {
        account: Option<AccountInfo>,
        repositories: Option<Vec<RepositoryInfo>>,
        account_calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityProvider for StubProvider {
        async fn current_account(&self, _credential: &str) -> std::result::Result<AccountInfo, ProviderError> {
            self.account_calls.fetch_add(1, Ordering::SeqCst);
            self.account.clone().ok_or(ProviderError::Unauthorized)
        }

        async fn installation_repositories(
            &self,
            _credential: &str,
        ) -> std::result::Result<Vec<RepositoryInfo>, ProviderError> {
            self.repositories.clone().ok_or(ProviderError::Forbidden)
        }

        async fn org_membership(
            &self,
            _credential: &str,
            _org: &str,
        ) -> std::result::Result<OrgMembership, ProviderError> {
            Err(ProviderError::NotFound)
        }

        async fn start_device_flow(
            &self,
            _client_id: &str,
        ) -> std::result::Result<serde_json::Value, ProviderError> {
            Err(ProviderError::NotFound)
        }
    }

    fn repo(owner: &str, name: &str) -> RepositoryInfo {
        RepositoryInfo {
            name: name.to_string(),
            owner: RepositoryOwner {
                login: owner.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_resolves_user_first() {
        let resolver = IdentityResolver::new(Arc::new(StubProvider {
            account: Some(AccountInfo {
                id: 7,
                login: "Alice".to_string(),
                name: Some("Alice A".to_string()),
            }),
            repositories: Some(vec![repo("acme", "tools")]),
            ..Default::default()
        }));

        let identity = resolver.resolve("tok").await.unwrap().unwrap();
        assert_eq!(
            identity,
            Identity::User {
                scope: "alice".to_string(),
                user_id: 7,
                display_name: Some("Alice A".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_installation() {
        let resolver = IdentityResolver::new(Arc::new(StubProvider {
            account: None,
            repositories: Some(vec![repo("Acme", "tools"), repo("Acme", "site")]),
            ..Default::default()
        }));

        let identity = resolver.resolve("tok").await.unwrap().unwrap();
        match identity {
            Identity::Installation {
                scope,
                repositories,
            } => {
                assert_eq!(scope, "acme");
                assert_eq!(repositories, vec!["tools", "site"]);
            }
            other => panic!("expected installation identity, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_ambiguous_owners_picks_first() {
        let resolver = IdentityResolver::new(Arc::new(StubProvider {
            account: None,
            repositories: Some(vec![repo("acme", "tools"), repo("globex", "app")]),
            ..Default::default()
        }));

        let identity = resolver.resolve("tok").await.unwrap().unwrap();
        assert_eq!(identity.scope(), "acme");
    }

    #[tokio::test]
    async fn test_both_interpretations_fail() {
        let resolver = IdentityResolver::new(Arc::new(StubProvider {
            account: None,
            repositories: None,
            ..Default::default()
        }));

        assert!(resolver.resolve("tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_installation_fails() {
        let resolver = IdentityResolver::new(Arc::new(StubProvider {
            account: None,
            repositories: Some(Vec::new()),
            ..Default::default()
        }));

        assert!(resolver.resolve("tok").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolution_is_cached() {
        let provider = Arc::new(StubProvider {
            account: Some(AccountInfo {
                id: 7,
                login: "alice".to_string(),
                name: None,
            }),
            repositories: None,
            ..Default::default()
        });
        let resolver = IdentityResolver::new(provider.clone());

        resolver.resolve("tok").await.unwrap().unwrap();
        resolver.resolve("tok").await.unwrap().unwrap();
        assert_eq!(provider.account_calls.load(Ordering::SeqCst), 1);

        // A different credential misses the cache.
        resolver.resolve("other").await.unwrap().unwrap();
        assert_eq!(provider.account_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_fingerprint_is_stable_and_distinct() {
        assert_eq!(credential_fingerprint("a"), credential_fingerprint("a"));
        assert_ne!(credential_fingerprint("a"), credential_fingerprint("b"));
        assert_eq!(credential_fingerprint("a").len(), 64);
    }
}
