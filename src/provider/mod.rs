mod http;

pub use http::HttpIdentityProvider;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The credential was rejected outright.
    #[error("credential rejected")]
    Unauthorized,
    /// The credential is valid but lacks the scope for this lookup.
    #[error("credential lacks required scope")]
    Forbidden,
    #[error("not found")]
    NotFound,
    #[error("identity provider request failed: {0}")]
    Http(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

/// The authenticated account behind a personal credential.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountInfo {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryOwner {
    pub login: String,
}

/// A repository an installation credential can reach.
#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub owner: RepositoryOwner,
}

/// Membership of the credential's account in an organization.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgMembership {
    pub role: String,
    pub state: String,
}

impl OrgMembership {
    /// Active administrative membership is the only grade that authorizes
    /// mutations in a foreign scope.
    #[must_use]
    pub fn is_active_admin(&self) -> bool {
        self.role == "admin" && self.state == "active"
    }
}

/// Client contract against the external identity provider. The server only
/// ever performs these four lookups; everything else about the provider
/// (device-flow UI, token issuance) happens outside this process.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// "Who am I" lookup for a personal credential.
    async fn current_account(&self, credential: &str) -> Result<AccountInfo, ProviderError>;

    /// "What can I reach" lookup for an installation credential.
    async fn installation_repositories(
        &self,
        credential: &str,
    ) -> Result<Vec<RepositoryInfo>, ProviderError>;

    /// Membership-and-role lookup for a target organization.
    async fn org_membership(
        &self,
        credential: &str,
        org: &str,
    ) -> Result<OrgMembership, ProviderError>;

    /// Initiates the provider's device flow; the response body is passed
    /// through to the caller untouched.
    async fn start_device_flow(
        &self,
        client_id: &str,
    ) -> Result<serde_json::Value, ProviderError>;
}
