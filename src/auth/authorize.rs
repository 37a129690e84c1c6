use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{Identity, TtlCache, credential_fingerprint};
use crate::error::{Error, Result};
use crate::provider::{IdentityProvider, OrgMembership, ProviderError};
use crate::store::Store;

/// Capability that bypasses every scope check.
pub const ADMIN_PERMISSION: &str = "admin";

const MEMBERSHIP_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Decides whether a resolved identity may mutate a target scope.
///
/// Checks run in fixed order: global admin capability, own scope, then (for
/// user identities only) organization membership. Installation credentials
/// are permanently locked to their own scope.
pub struct ScopeAuthorizer {
    store: Arc<dyn Store>,
    provider: Arc<dyn IdentityProvider>,
    membership_cache: TtlCache<OrgMembership>,
}

impl ScopeAuthorizer {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            store,
            provider,
            membership_cache: TtlCache::new(MEMBERSHIP_CACHE_TTL),
        }
    }

    /// Returns `Ok(())` on allow; denials come back as
    /// [`Error::Authorization`] with the reason.
    pub async fn authorize(
        &self,
        identity: &Identity,
        credential: &str,
        target_scope: &str,
    ) -> Result<()> {
        // The permission store is durable state, re-read on every check.
        if let Some(id) = identity.permission_id() {
            if self.store.has_permission(id, ADMIN_PERMISSION)? {
                return Ok(());
            }
        }

        if identity.scope() == target_scope {
            return Ok(());
        }

        match identity {
            Identity::User { .. } => {
                let membership = self.lookup_membership(credential, target_scope).await?;
                if membership.is_active_admin() {
                    Ok(())
                } else {
                    Err(Error::Authorization(format!(
                        "not an admin of organization '{target_scope}'"
                    )))
                }
            }
            Identity::Installation { scope, .. } => Err(Error::Authorization(format!(
                "installation credential is locked to scope '{scope}'"
            ))),
        }
    }

    async fn lookup_membership(
        &self,
        credential: &str,
        target_scope: &str,
    ) -> Result<OrgMembership> {
        let key = format!("{}:{target_scope}", credential_fingerprint(credential));
        if let Some(membership) = self.membership_cache.get(&key) {
            return Ok(membership);
        }

        match self.provider.org_membership(credential, target_scope).await {
            Ok(membership) => {
                self.membership_cache.insert(key, membership.clone());
                Ok(membership)
            }
            Err(ProviderError::Forbidden | ProviderError::Unauthorized) => {
                Err(Error::Authorization(format!(
                    "cannot verify membership in '{target_scope}': credential lacks required scope"
                )))
            }
            Err(ProviderError::NotFound) => {
                debug!("no membership in '{target_scope}' for credential");
                Err(Error::Authorization(format!(
                    "not an admin of organization '{target_scope}'"
                )))
            }
            Err(ProviderError::Http(e)) => Err(Error::Provider(e)),
        }
    }
}
