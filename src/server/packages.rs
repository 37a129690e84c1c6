use std::io::SeekFrom;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::warn;

use super::AppState;
use super::dto::{
    DeleteResponse, RegistryListResponse, RegistryPackage, UploadResponse, VersionListResponse,
};
use super::response::ApiError;
use crate::auth::bearer_credential;
use crate::error::Error;
use crate::ratelimit::RateLimitStatus;
use crate::registry::{PackageName, UploadRequest};

/// Resolves path components for a public read endpoint. Nothing can be
/// stored under an invalid name, so malformed coordinates answer 404 here
/// rather than echoing validation detail.
fn readable_name(scope: &str, package: &str) -> Result<PackageName, ApiError> {
    PackageName::new(scope, package).map_err(|_| ApiError::not_found("Package not found"))
}

fn apply_rate_headers(response: &mut Response, rate: &RateLimitStatus) {
    let headers = response.headers_mut();
    if let Ok(value) = rate.limit.to_string().parse() {
        headers.insert("X-RateLimit-Limit", value);
    }
    if let Ok(value) = rate.remaining.to_string().parse() {
        headers.insert("X-RateLimit-Remaining", value);
    }
    if let Ok(value) = rate.reset_at.timestamp().to_string().parse() {
        headers.insert("X-RateLimit-Reset", value);
    }
}

pub async fn upload(
    State(state): State<Arc<AppState>>,
    Path((scope, package, version)): Path<(String, String, String)>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let client_key = addr.ip().to_string();
    let declared_size = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let request = UploadRequest {
        scope,
        package,
        version,
        credential: bearer_credential(&headers),
        client_key: client_key.clone(),
        declared_size,
        body,
    };

    match state.pipeline.upload(request).await {
        Ok(receipt) => {
            let body = UploadResponse {
                success: true,
                name: receipt.metadata.name,
                version: receipt.metadata.version,
                integrity: receipt.metadata.integrity,
                size: receipt.metadata.size,
                dependencies: receipt.metadata.dependencies,
            };
            let mut response = (StatusCode::CREATED, Json(body)).into_response();
            apply_rate_headers(&mut response, &receipt.rate);
            response
        }
        Err(e @ Error::RateLimited) => {
            let rate = state.limiter.status(&client_key).ok().flatten();
            let mut response = ApiError::from(e).into_response();
            if let Some(rate) = rate {
                apply_rate_headers(&mut response, &rate);
            }
            response
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}

pub async fn download(
    State(state): State<Arc<AppState>>,
    Path((scope, package, version)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let name = readable_name(&scope, &package)?;

    // The integrity hash doubles as a strong ETag. An archive whose metadata
    // write failed is still downloadable, just without one.
    let etag = state
        .archive
        .get_metadata(&name, &version)
        .await
        .unwrap_or_else(|e| {
            warn!("metadata lookup failed for {name}@{version}: {e}");
            None
        })
        .map(|m| m.integrity);

    if let (Some(etag), Some(candidate)) = (&etag, headers.get(header::IF_NONE_MATCH)) {
        if etag_matches(candidate.to_str().unwrap_or_default(), etag) {
            let mut response = StatusCode::NOT_MODIFIED.into_response();
            set_etag(&mut response, etag);
            return Ok(response);
        }
    }

    let (mut file, size) = match state.archive.get_archive(&name, &version).await {
        Ok(found) => found,
        Err(Error::NotFound) => return Err(ApiError::not_found("Package version not found")),
        Err(e) => return Err(e.into()),
    };

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_range(v, size));

    let mut response = match range {
        Some((start, _)) if start >= size => {
            let mut response = StatusCode::RANGE_NOT_SATISFIABLE.into_response();
            if let Ok(value) = format!("bytes */{size}").parse() {
                response
                    .headers_mut()
                    .insert(header::CONTENT_RANGE, value);
            }
            return Ok(response);
        }
        Some((start, end)) => {
            let end = end.min(size - 1);
            file.seek(SeekFrom::Start(start))
                .await
                .map_err(Error::from)?;
            let length = end - start + 1;
            let stream = ReaderStream::new(file.take(length));

            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .header(header::CONTENT_LENGTH, length)
                .header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{size}"))
                .header(header::ACCEPT_RANGES, "bytes")
                .header("X-Content-Type-Options", "nosniff")
                .body(Body::from_stream(stream))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
        None => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, size)
            .header(header::ACCEPT_RANGES, "bytes")
            .header("X-Content-Type-Options", "nosniff")
            .body(Body::from_stream(ReaderStream::new(file)))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
    };

    if let Some(etag) = &etag {
        set_etag(&mut response, etag);
    }
    Ok(response)
}

pub async fn metadata(
    State(state): State<Arc<AppState>>,
    Path((scope, package, version)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let name = readable_name(&scope, &package)?;

    match state.archive.get_metadata(&name, &version).await {
        Ok(Some(metadata)) => Ok(Json(metadata).into_response()),
        Ok(None) => Err(ApiError::not_found("Package version not found")),
        Err(e) => Err(e.into()),
    }
}

pub async fn list_versions(
    State(state): State<Arc<AppState>>,
    Path((scope, package)): Path<(String, String)>,
) -> Result<Json<VersionListResponse>, ApiError> {
    let name = readable_name(&scope, &package)?;

    let index = state
        .index
        .get(&name)
        .await?
        .ok_or_else(|| ApiError::not_found("Package not found"))?;

    Ok(Json(VersionListResponse {
        name: index.name.clone(),
        latest: index.latest().map(|v| v.version.clone()),
        versions: index.versions.into_iter().map(|v| v.version).collect(),
    }))
}

pub async fn list_registry(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RegistryListResponse>, ApiError> {
    let indexes = state.archive.list_indexes().await?;

    let packages = indexes
        .into_iter()
        .map(|index| RegistryPackage {
            latest: index.latest().map(|v| v.version.clone()),
            version_count: index.versions.len(),
            name: index.name,
        })
        .collect();

    Ok(Json(RegistryListResponse { packages }))
}

pub async fn delete_version(
    State(state): State<Arc<AppState>>,
    Path((scope, package, version)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> Result<Json<DeleteResponse>, ApiError> {
    let credential = bearer_credential(&headers).ok_or(Error::Authentication)?;
    let identity = state
        .resolver
        .resolve(&credential)
        .await?
        .ok_or(Error::Authentication)?;

    let name = readable_name(&scope, &package)?;
    state
        .authorizer
        .authorize(&identity, &credential, name.scope())
        .await?;

    if !state.archive.delete_version(&name, &version).await? {
        return Err(ApiError::not_found("Package version not found"));
    }

    // Unlike uploads, a delete that cannot unlist the version must not
    // report success: readers would keep seeing it.
    state.index.remove(&name, &version).await?;

    Ok(Json(DeleteResponse {
        success: true,
        name: name.display(),
        version,
        deleted_at: Utc::now(),
    }))
}

fn set_etag(response: &mut Response, integrity: &str) {
    if let Ok(value) = format!("\"{integrity}\"").parse() {
        response.headers_mut().insert(header::ETAG, value);
    }
}

fn etag_matches(candidate: &str, integrity: &str) -> bool {
    candidate
        .split(',')
        .map(|tag| tag.trim().trim_start_matches("W/").trim_matches('"'))
        .any(|tag| tag == integrity || tag == "*")
}

/// Parses a single-range `Range` header against the full object size.
/// Malformed headers are ignored (full response); an out-of-bounds start is
/// reported by the caller as 416.
fn parse_range(value: &str, size: u64) -> Option<(u64, u64)> {
    let spec = value.strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (start, end) = spec.split_once('-')?;

    match (start.is_empty(), end.is_empty()) {
        // bytes=a-b
        (false, false) => {
            let start: u64 = start.parse().ok()?;
            let end: u64 = end.parse().ok()?;
            (start <= end).then_some((start, end))
        }
        // bytes=a-
        (false, true) => {
            let start: u64 = start.parse().ok()?;
            Some((start, size.saturating_sub(1)))
        }
        // bytes=-suffix
        (true, false) => {
            let suffix: u64 = end.parse().ok()?;
            if suffix == 0 {
                return None;
            }
            Some((size.saturating_sub(suffix), size.saturating_sub(1)))
        }
        (true, true) => None,
    }
}
