use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;

use super::AppState;
use super::dto::PermissionsResponse;
use super::response::ApiError;
use crate::auth::{ADMIN_PERMISSION, bearer_credential};
use crate::error::Error;

const MAX_PERMISSION_LEN: usize = 64;

/// Permission management is restricted to callers that themselves hold the
/// global admin capability.
async fn require_admin(state: &Arc<AppState>, headers: &HeaderMap) -> Result<(), ApiError> {
    let credential = bearer_credential(headers).ok_or(Error::Authentication)?;
    let identity = state
        .resolver
        .resolve(&credential)
        .await?
        .ok_or(Error::Authentication)?;

    let identity_id = identity
        .permission_id()
        .ok_or_else(|| ApiError::forbidden("Admin access requires a user identity"))?;
    if !state.store.has_permission(identity_id, ADMIN_PERMISSION)? {
        return Err(ApiError::forbidden("Admin access required"));
    }
    Ok(())
}

fn validate_permission(permission: &str) -> Result<(), ApiError> {
    if permission.is_empty()
        || permission.len() > MAX_PERMISSION_LEN
        || !permission
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | ':'))
    {
        return Err(ApiError::bad_request(format!(
            "Invalid permission: {permission}"
        )));
    }
    Ok(())
}

fn permissions_response(
    state: &Arc<AppState>,
    user: i64,
) -> Result<Json<PermissionsResponse>, ApiError> {
    let permissions = state.store.list_permissions(user)?;
    Ok(Json(PermissionsResponse {
        success: true,
        user,
        permissions,
    }))
}

pub async fn grant(
    State(state): State<Arc<AppState>>,
    Path((user, permission)): Path<(i64, String)>,
    headers: HeaderMap,
) -> Result<Json<PermissionsResponse>, ApiError> {
    require_admin(&state, &headers).await?;
    validate_permission(&permission)?;

    state.store.grant_permission(user, &permission)?;
    permissions_response(&state, user)
}

pub async fn revoke(
    State(state): State<Arc<AppState>>,
    Path((user, permission)): Path<(i64, String)>,
    headers: HeaderMap,
) -> Result<Json<PermissionsResponse>, ApiError> {
    require_admin(&state, &headers).await?;

    if !state.store.revoke_permission(user, &permission)? {
        return Err(ApiError::not_found("Permission not found"));
    }
    permissions_response(&state, user)
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(user): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<PermissionsResponse>, ApiError> {
    require_admin(&state, &headers).await?;
    permissions_response(&state, user)
}
