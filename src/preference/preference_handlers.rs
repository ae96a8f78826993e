use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::{error::Result, state::AppState};
use super::{preference_dto::UpdatePreferencesRequest, preference_models::NotificationPreferences};

/// Get a user's notification preferences, creating the defaults on first read
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/preferences",
    params(
        ("user_id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Notification preferences", body = NotificationPreferences)
    ),
    tag = "preferences"
)]
pub async fn get_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<NotificationPreferences>> {
    let prefs = state.preference_service.get_user_preferences(user_id).await?;

    Ok(Json(prefs))
}

/// Merge an update into a user's notification preferences
#[utoipa::path(
    put,
    path = "/api/users/{user_id}/preferences",
    params(
        ("user_id" = Uuid, Path, description = "User ID")
    ),
    request_body = UpdatePreferencesRequest,
    responses(
        (status = 200, description = "Updated preferences", body = NotificationPreferences),
        (status = 400, description = "Invalid quiet hours or timezone")
    ),
    tag = "preferences"
)]
pub async fn update_preferences(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdatePreferencesRequest>,
) -> Result<Json<NotificationPreferences>> {
    let prefs = state
        .preference_service
        .update_preferences(user_id, payload)
        .await?;

    Ok(Json(prefs))
}
