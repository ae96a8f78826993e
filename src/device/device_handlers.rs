use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{error::Result, state::AppState};
use super::{device_dto::RegisterDeviceRequest, device_models::Device};

/// Register or refresh a push device
#[utoipa::path(
    post,
    path = "/api/users/{user_id}/devices",
    params(
        ("user_id" = Uuid, Path, description = "User ID")
    ),
    request_body = RegisterDeviceRequest,
    responses(
        (status = 201, description = "Device registered", body = Device),
        (status = 400, description = "Invalid device payload")
    ),
    tag = "devices"
)]
pub async fn register_device(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<RegisterDeviceRequest>,
) -> Result<(StatusCode, Json<Device>)> {
    let device = state.device_service.register_device(user_id, payload).await?;

    Ok((StatusCode::CREATED, Json(device)))
}

/// Deactivate a push device
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}/devices/{device_id}",
    params(
        ("user_id" = Uuid, Path, description = "User ID"),
        ("device_id" = String, Path, description = "Client device identifier")
    ),
    responses(
        (status = 204, description = "Device deactivated"),
        (status = 404, description = "Device not found")
    ),
    tag = "devices"
)]
pub async fn unregister_device(
    State(state): State<AppState>,
    Path((user_id, device_id)): Path<(Uuid, String)>,
) -> Result<StatusCode> {
    state.device_service.unregister_device(user_id, &device_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
