use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;

use super::AppState;
use super::dto::DeviceCodeRequest;
use super::response::ApiError;

/// Initiates the identity provider's device flow on behalf of the client.
/// The registry only forwards the request; the interactive flow itself
/// happens between the user and the provider.
pub async fn device_code(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request: DeviceCodeRequest = if body.is_empty() {
        DeviceCodeRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("Invalid request body: {e}")))?
    };

    let client_id = request
        .client_id
        .or_else(|| state.config.device_client_id.clone())
        .ok_or_else(|| ApiError::internal("Device flow is not configured"))?;

    let response = state
        .provider
        .start_device_flow(&client_id)
        .await
        .map_err(|e| {
            tracing::error!("device flow initiation failed: {e}");
            ApiError::internal("Device flow initiation failed")
        })?;

    Ok(Json(response))
}
