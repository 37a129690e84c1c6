use std::sync::Arc;
use std::time::Instant;

use axum::extract::{DefaultBodyLimit, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;

use super::{device, packages, permissions};
use crate::auth::{IdentityResolver, ScopeAuthorizer};
use crate::config::ServerConfig;
use crate::provider::IdentityProvider;
use crate::ratelimit::RateLimiter;
use crate::registry::{ArchiveStore, UploadPipeline, VersionIndex};
use crate::store::Store;

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub provider: Arc<dyn IdentityProvider>,
    pub resolver: Arc<IdentityResolver>,
    pub authorizer: Arc<ScopeAuthorizer>,
    pub archive: Arc<ArchiveStore>,
    pub index: Arc<VersionIndex>,
    pub limiter: Arc<RateLimiter>,
    pub pipeline: UploadPipeline,
    pub config: ServerConfig,
}

impl AppState {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn IdentityProvider>,
        config: ServerConfig,
    ) -> Self {
        let resolver = Arc::new(IdentityResolver::new(provider.clone()));
        let authorizer = Arc::new(ScopeAuthorizer::new(store.clone(), provider.clone()));
        let archive = Arc::new(ArchiveStore::new(&config.data_dir));
        let index = Arc::new(VersionIndex::new(archive.clone()));
        let limiter = Arc::new(RateLimiter::new(
            store.clone(),
            config.rate_limit,
            config.rate_window,
        ));
        let pipeline = UploadPipeline::new(
            resolver.clone(),
            authorizer.clone(),
            archive.clone(),
            index.clone(),
            limiter.clone(),
            config.max_package_bytes,
        );

        Self {
            store,
            provider,
            resolver,
            authorizer,
            archive,
            index,
            limiter,
            pipeline,
            config,
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    tracing::info!(
        "{} {} {} {}ms",
        method,
        uri.path(),
        status.as_u16(),
        latency.as_millis()
    );

    response
}

pub fn create_router(state: Arc<AppState>) -> Router {
    // The pipeline enforces the configured archive size itself; the router
    // only needs axum's default cap out of the way.
    let body_limit = state.config.max_package_bytes as usize + 1024;

    Router::new()
        .route("/health", get(health))
        .route("/packages", get(packages::list_registry))
        .route("/packages/{scope}/{package}", get(packages::list_versions))
        .route(
            "/packages/{scope}/{package}/{version}",
            post(packages::upload)
                .get(packages::download)
                .delete(packages::delete_version),
        )
        .route(
            "/packages/{scope}/{package}/{version}/metadata",
            get(packages::metadata),
        )
        .route("/auth/device/code", post(device::device_code))
        .route("/permissions/{user}", get(permissions::list))
        .route(
            "/permissions/{user}/{permission}",
            post(permissions::grant).delete(permissions::revoke),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}
