use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;

use super::{AccountInfo, IdentityProvider, OrgMembership, ProviderError, RepositoryInfo};

const USER_AGENT: &str = concat!("packman/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// GitHub-style HTTP identity provider.
pub struct HttpIdentityProvider {
    client: Client,
    base_url: String,
    device_code_url: String,
}

#[derive(Deserialize)]
struct InstallationRepositories {
    repositories: Vec<RepositoryInfo>,
}

impl HttpIdentityProvider {
    #[must_use]
    pub fn new(base_url: impl Into<String>, device_code_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            device_code_url: device_code_url.into(),
        }
    }

    async fn get(&self, path: &str, credential: &str) -> Result<Response, ProviderError> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(credential)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        check_status(resp)
    }
}

fn check_status(resp: Response) -> Result<Response, ProviderError> {
    match resp.status() {
        StatusCode::UNAUTHORIZED => Err(ProviderError::Unauthorized),
        StatusCode::FORBIDDEN => Err(ProviderError::Forbidden),
        StatusCode::NOT_FOUND => Err(ProviderError::NotFound),
        status if status.is_success() => Ok(resp),
        status => Err(ProviderError::Http(format!(
            "unexpected status {status} from identity provider"
        ))),
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn current_account(&self, credential: &str) -> Result<AccountInfo, ProviderError> {
        let resp = self.get("/user", credential).await?;
        Ok(resp.json().await?)
    }

    async fn installation_repositories(
        &self,
        credential: &str,
    ) -> Result<Vec<RepositoryInfo>, ProviderError> {
        let resp = self.get("/installation/repositories", credential).await?;
        let body: InstallationRepositories = resp.json().await?;
        Ok(body.repositories)
    }

    async fn org_membership(
        &self,
        credential: &str,
        org: &str,
    ) -> Result<OrgMembership, ProviderError> {
        let resp = self
            .get(&format!("/user/memberships/orgs/{org}"), credential)
            .await?;
        Ok(resp.json().await?)
    }

    async fn start_device_flow(
        &self,
        client_id: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        let resp = self
            .client
            .post(&self.device_code_url)
            .header("Accept", "application/json")
            .json(&serde_json::json!({ "client_id": client_id }))
            .send()
            .await?;
        let resp = check_status(resp)?;
        Ok(resp.json().await?)
    }
}
