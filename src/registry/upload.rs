use std::sync::Arc;

use axum::body::Body;
use chrono::Utc;
use tracing::{debug, warn};

use super::{
    ArchiveStore, PackageName, VersionIndex, compute_integrity, extract_manifest,
    validate_version,
};
use crate::auth::{Identity, IdentityResolver, ScopeAuthorizer};
use crate::error::{Error, Result};
use crate::ratelimit::{RateLimitStatus, RateLimiter};
use crate::types::{PackageMetadata, VersionSummary};

/// One publish request, as received from the HTTP layer with the body still
/// unread.
pub struct UploadRequest {
    pub scope: String,
    pub package: String,
    pub version: String,
    pub credential: Option<String>,
    pub client_key: String,
    pub declared_size: Option<u64>,
    pub body: Body,
}

pub struct UploadReceipt {
    pub metadata: PackageMetadata,
    pub rate: RateLimitStatus,
}

/// Orchestrates the single mutating hot path: a linear sequence of
/// short-circuiting gates followed by the persistence steps.
///
/// Partial-failure policy: the archive is persisted before its metadata; if
/// the metadata write fails the archive is left orphaned, with no
/// compensating delete. A failed index update does not roll back an
/// otherwise successful upload; archive and metadata are the source of
/// truth and the index is a derived view.
pub struct UploadPipeline {
    resolver: Arc<IdentityResolver>,
    authorizer: Arc<ScopeAuthorizer>,
    archive: Arc<ArchiveStore>,
    index: Arc<VersionIndex>,
    limiter: Arc<RateLimiter>,
    max_package_bytes: u64,
}

impl UploadPipeline {
    #[must_use]
    pub fn new(
        resolver: Arc<IdentityResolver>,
        authorizer: Arc<ScopeAuthorizer>,
        archive: Arc<ArchiveStore>,
        index: Arc<VersionIndex>,
        limiter: Arc<RateLimiter>,
        max_package_bytes: u64,
    ) -> Self {
        Self {
            resolver,
            authorizer,
            archive,
            index,
            limiter,
            max_package_bytes,
        }
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt> {
        // Gate: authentication (401).
        let credential = request.credential.as_deref().ok_or(Error::Authentication)?;
        let identity = self
            .resolver
            .resolve(credential)
            .await?
            .ok_or(Error::Authentication)?;

        // Gate: name and version format (403).
        let name = PackageName::new(&request.scope, &request.package)?;
        validate_version(&request.version).map_err(Error::Validation)?;

        // Gate: scope authorization (403).
        self.authorizer
            .authorize(&identity, credential, name.scope())
            .await?;

        // Gate: create-once (409). Check-then-act: a concurrent upload of the
        // same version can slip through; the later writer wins downstream.
        if self.index.exists(&name, &request.version).await? {
            return Err(Error::VersionExists);
        }

        // Gate: rate limit (429).
        let rate = self.limiter.check_limit(&request.client_key)?;
        if !rate.allowed {
            return Err(Error::RateLimited);
        }

        // Gate: size (413), judged on the declared length before the body is
        // pulled in, then enforced again while reading.
        if request
            .declared_size
            .is_some_and(|size| size > self.max_package_bytes)
        {
            return Err(Error::PayloadTooLarge);
        }
        let bytes = axum::body::to_bytes(request.body, self.max_package_bytes as usize)
            .await
            .map_err(|e| {
                debug!("rejecting upload body: {e}");
                Error::PayloadTooLarge
            })?;

        let integrity = compute_integrity(&bytes);

        self.archive
            .put_archive(&name, &request.version, &bytes)
            .await?;

        // Best-effort; a missing or malformed manifest never fails the
        // upload.
        let dependencies = extract_manifest(&bytes);

        let metadata = PackageMetadata {
            name: name.display(),
            version: request.version.clone(),
            integrity,
            size: bytes.len() as u64,
            uploaded_at: Utc::now(),
            uploaded_by: uploaded_by(&identity),
            dependencies,
        };
        self.archive
            .put_metadata(&name, &request.version, &metadata)
            .await?;

        let summary = VersionSummary {
            version: metadata.version.clone(),
            integrity: metadata.integrity.clone(),
            size: metadata.size,
            uploaded_at: metadata.uploaded_at,
            dependencies: metadata.dependencies.clone(),
        };
        if let Err(e) = self.index.create(&name, summary).await {
            warn!("index update failed for {name}@{}: {e}", metadata.version);
        }

        if let Err(e) = self.limiter.increment(&request.client_key) {
            warn!("rate counter increment failed for {}: {e}", request.client_key);
        }
        let rate = self
            .limiter
            .status(&request.client_key)
            .ok()
            .flatten()
            .unwrap_or(rate);

        Ok(UploadReceipt { metadata, rate })
    }
}

fn uploaded_by(identity: &Identity) -> String {
    identity.scope().to_string()
}
