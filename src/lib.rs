//! # Packman
//!
//! A package registry server, usable both as a standalone binary and as a
//! library. Packages are versioned tar.gz archives published under an owner
//! scope (a user or organization); publishing is authenticated against an
//! external identity provider and rate limited per client.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! packman = { version = "0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use packman::config::ServerConfig;
//! use packman::provider::HttpIdentityProvider;
//! use packman::server::{AppState, create_router};
//! use packman::store::SqliteStore;
//!
//! let config = ServerConfig::default();
//! let store = SqliteStore::new(config.db_path()).unwrap();
//! store.initialize().unwrap();
//!
//! let provider = Arc::new(HttpIdentityProvider::new(
//!     "https://api.github.com",
//!     "https://github.com/login/device/code",
//! ));
//! let state = Arc::new(AppState::new(Arc::new(store), provider, config));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Includes the binary entry point. Disable with
//!   `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod provider;
pub mod ratelimit;
pub mod registry;
pub mod server;
pub mod store;
pub mod types;
