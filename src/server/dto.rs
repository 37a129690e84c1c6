use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub success: bool,
    pub name: String,
    pub version: String,
    pub integrity: String,
    pub size: u64,
    pub dependencies: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionListResponse {
    pub name: String,
    pub versions: Vec<String>,
    pub latest: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryPackage {
    pub name: String,
    pub latest: Option<String>,
    pub version_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryListResponse {
    pub packages: Vec<RegistryPackage>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub success: bool,
    pub name: String,
    pub version: String,
    pub deleted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsResponse {
    pub success: bool,
    pub user: i64,
    pub permissions: Vec<String>,
}

// Mirrors the provider's own device-flow request shape.
#[derive(Debug, Default, Deserialize)]
pub struct DeviceCodeRequest {
    #[serde(default)]
    pub client_id: Option<String>,
}
