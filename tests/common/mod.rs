use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, Response, StatusCode, header};
use flate2::Compression;
use flate2::write::GzEncoder;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use packman::config::ServerConfig;
use packman::provider::{
    AccountInfo, IdentityProvider, OrgMembership, ProviderError, RepositoryInfo, RepositoryOwner,
};
use packman::server::{AppState, create_router};
use packman::store::{SqliteStore, Store};

/// Scriptable identity provider; each credential maps to the lookups it can
/// answer.
#[derive(Default)]
pub struct MockProvider {
    accounts: Mutex<HashMap<String, AccountInfo>>,
    installations: Mutex<HashMap<String, Vec<RepositoryInfo>>>,
    memberships: Mutex<HashMap<(String, String), OrgMembership>>,
    unverifiable_memberships: Mutex<HashSet<(String, String)>>,
    device_response: Mutex<Option<Value>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, credential: &str, id: i64, login: &str) -> Self {
        self.accounts.lock().unwrap().insert(
            credential.to_string(),
            AccountInfo {
                id,
                login: login.to_string(),
                name: None,
            },
        );
        self
    }

    pub fn with_installation(self, credential: &str, owner: &str, repos: &[&str]) -> Self {
        let repositories = repos
            .iter()
            .map(|name| RepositoryInfo {
                name: (*name).to_string(),
                owner: RepositoryOwner {
                    login: owner.to_string(),
                },
            })
            .collect();
        self.installations
            .lock()
            .unwrap()
            .insert(credential.to_string(), repositories);
        self
    }

    pub fn with_membership(self, credential: &str, org: &str, role: &str, state: &str) -> Self {
        self.memberships.lock().unwrap().insert(
            (credential.to_string(), org.to_string()),
            OrgMembership {
                role: role.to_string(),
                state: state.to_string(),
            },
        );
        self
    }

    /// Marks a membership lookup as failing the way a credential without the
    /// org-read scope does.
    pub fn with_unverifiable_membership(self, credential: &str, org: &str) -> Self {
        self.unverifiable_memberships
            .lock()
            .unwrap()
            .insert((credential.to_string(), org.to_string()));
        self
    }

    pub fn with_device_response(self, response: Value) -> Self {
        *self.device_response.lock().unwrap() = Some(response);
        self
    }
}

#[async_trait]
impl IdentityProvider for MockProvider {
    async fn current_account(&self, credential: &str) -> Result<AccountInfo, ProviderError> {
        self.accounts
            .lock()
            .unwrap()
            .get(credential)
            .cloned()
            .ok_or(ProviderError::Unauthorized)
    }

    async fn installation_repositories(
        &self,
        credential: &str,
    ) -> Result<Vec<RepositoryInfo>, ProviderError> {
        self.installations
            .lock()
            .unwrap()
            .get(credential)
            .cloned()
            .ok_or(ProviderError::Unauthorized)
    }

    async fn org_membership(
        &self,
        credential: &str,
        org: &str,
    ) -> Result<OrgMembership, ProviderError> {
        let key = (credential.to_string(), org.to_string());
        if self.unverifiable_memberships.lock().unwrap().contains(&key) {
            return Err(ProviderError::Forbidden);
        }
        self.memberships
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or(ProviderError::NotFound)
    }

    async fn start_device_flow(&self, _client_id: &str) -> Result<Value, ProviderError> {
        self.device_response
            .lock()
            .unwrap()
            .clone()
            .ok_or(ProviderError::NotFound)
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    _temp_dir: TempDir,
}

impl TestApp {
    pub fn new(provider: MockProvider) -> Self {
        Self::with_config(provider, |_| {})
    }

    pub fn with_config(provider: MockProvider, configure: impl FnOnce(&mut ServerConfig)) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");

        let mut config = ServerConfig {
            data_dir: temp_dir.path().to_path_buf(),
            ..ServerConfig::default()
        };
        configure(&mut config);

        let store = SqliteStore::new(config.db_path()).expect("open store");
        store.initialize().expect("initialize store");

        let state = Arc::new(AppState::new(Arc::new(store), Arc::new(provider), config));
        let router = create_router(state.clone())
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 41000))));

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("send request")
    }

    /// Sends a request and decodes the JSON body.
    pub async fn send_json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.send(request).await;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("parse body")
        };
        (status, body)
    }

    pub async fn upload(
        &self,
        credential: Option<&str>,
        scope: &str,
        package: &str,
        version: &str,
        payload: &[u8],
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri(format!("/packages/{scope}/{package}/{version}"))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, payload.len());
        if let Some(credential) = credential {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {credential}"));
        }
        let request = builder.body(Body::from(payload.to_vec())).unwrap();
        self.send_json(request).await
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send_json(request).await
    }

    pub async fn delete(&self, credential: Option<&str>, uri: &str) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("DELETE").uri(uri);
        if let Some(credential) = credential {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {credential}"));
        }
        let request = builder.body(Body::empty()).unwrap();
        self.send_json(request).await
    }
}

/// Builds a tar.gz archive from (path, contents) pairs.
pub fn targz(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, path, contents.as_bytes())
            .expect("append archive entry");
    }
    builder
        .into_inner()
        .expect("finish tar")
        .finish()
        .expect("finish gzip")
}

/// A minimal valid payload with no manifest.
pub fn plain_archive() -> Vec<u8> {
    targz(&[("src/lib.rs", "pub fn answer() -> u32 { 42 }")])
}
