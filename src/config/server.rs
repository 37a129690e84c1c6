use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::ratelimit;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Base URL of the identity provider API (e.g., "https://api.github.com").
    pub provider_url: String,
    /// URL of the identity provider's device-flow initiation endpoint.
    pub device_code_url: String,
    /// OAuth client id used when a device-flow request does not carry one.
    pub device_client_id: Option<String>,
    /// Maximum accepted package archive size in bytes.
    pub max_package_bytes: u64,
    /// Mutations allowed per client within one rate window.
    pub rate_limit: u32,
    /// Length of one rate window.
    pub rate_window: Duration,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("packman.db")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            provider_url: "https://api.github.com".to_string(),
            device_code_url: "https://github.com/login/device/code".to_string(),
            device_client_id: None,
            max_package_bytes: 10 * 1024 * 1024,
            rate_limit: ratelimit::DEFAULT_LIMIT,
            rate_window: ratelimit::DEFAULT_WINDOW,
        }
    }
}
