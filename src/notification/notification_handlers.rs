use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::Utc;
use futures::stream::Stream;
use std::convert::Infallible;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use uuid::Uuid;

use crate::{
    delivery::{BatchSummary, SweepReport},
    error::Result,
    state::AppState,
};
use super::{
    notification_dto::{
        BulkNotificationRequest, CleanupResponse, MarkAllReadResponse, NotificationListResponse,
        NotificationQuery, SendNotificationRequest,
    },
    notification_models::Notification,
    notification_repository::DeliveryAttempt,
};

/// Send a notification to one or more recipients
#[utoipa::path(
    post,
    path = "/api/notifications",
    request_body = SendNotificationRequest,
    responses(
        (status = 201, description = "Notifications created and first delivery attempted", body = BatchSummary),
        (status = 400, description = "Invalid request")
    ),
    tag = "notifications"
)]
pub async fn send_notification(
    State(state): State<AppState>,
    Json(payload): Json<SendNotificationRequest>,
) -> Result<(StatusCode, Json<BatchSummary>)> {
    let summary = state
        .notification_service
        .send_notification(payload, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(summary)))
}

/// Send the same content to many recipients in batches
#[utoipa::path(
    post,
    path = "/api/notifications/bulk",
    request_body = BulkNotificationRequest,
    responses(
        (status = 201, description = "Batches processed", body = BatchSummary),
        (status = 400, description = "Invalid request")
    ),
    tag = "notifications"
)]
pub async fn send_bulk_notification(
    State(state): State<AppState>,
    Json(payload): Json<BulkNotificationRequest>,
) -> Result<(StatusCode, Json<BatchSummary>)> {
    let summary = state
        .notification_service
        .send_bulk_notification(payload, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(summary)))
}

/// List a user's notifications, newest first
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/notifications",
    params(
        ("user_id" = Uuid, Path, description = "Recipient user ID"),
        NotificationQuery
    ),
    responses(
        (status = 200, description = "Page of notifications", body = NotificationListResponse),
        (status = 400, description = "Unknown notification type")
    ),
    tag = "notifications"
)]
pub async fn get_notifications(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<NotificationListResponse>> {
    let response = state
        .notification_service
        .get_user_notifications(user_id, query, Utc::now())
        .await?;

    Ok(Json(response))
}

/// Subscribe to a user's in-app notifications via Server-Sent Events
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/notifications/stream",
    params(
        ("user_id" = Uuid, Path, description = "Recipient user ID")
    ),
    responses(
        (status = 200, description = "SSE stream of in-app notifications")
    ),
    tag = "notifications"
)]
pub async fn notification_stream(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.in_app_tx.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(event) if event.user_id == user_id => Event::default()
            .event("notification")
            .json_data(&event.notification)
            .ok()
            .map(Ok::<_, Infallible>),
        // Lagged receivers just miss events; the inbox still has them.
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Mark a notification as read
#[utoipa::path(
    patch,
    path = "/api/users/{user_id}/notifications/{id}/read",
    params(
        ("user_id" = Uuid, Path, description = "Recipient user ID"),
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Notification marked as read", body = Notification),
        (status = 404, description = "Notification not found")
    ),
    tag = "notifications"
)]
pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path((user_id, notification_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Notification>> {
    let notification = state
        .notification_service
        .mark_as_read(notification_id, user_id, Utc::now())
        .await?;

    Ok(Json(notification))
}

/// Mark all of a user's notifications as read
#[utoipa::path(
    patch,
    path = "/api/users/{user_id}/notifications/read-all",
    params(
        ("user_id" = Uuid, Path, description = "Recipient user ID")
    ),
    responses(
        (status = 200, description = "Number of notifications updated", body = MarkAllReadResponse)
    ),
    tag = "notifications"
)]
pub async fn mark_all_notifications_read(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<MarkAllReadResponse>> {
    let updated = state
        .notification_service
        .mark_all_as_read(user_id, Utc::now())
        .await?;

    Ok(Json(MarkAllReadResponse { updated }))
}

/// Per-channel delivery attempts of a notification
#[utoipa::path(
    get,
    path = "/api/users/{user_id}/notifications/{id}/deliveries",
    params(
        ("user_id" = Uuid, Path, description = "Recipient user ID"),
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 200, description = "Delivery attempts", body = Vec<DeliveryAttempt>),
        (status = 404, description = "Notification not found")
    ),
    tag = "notifications"
)]
pub async fn get_notification_deliveries(
    State(state): State<AppState>,
    Path((user_id, notification_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Vec<DeliveryAttempt>>> {
    let attempts = state
        .notification_service
        .get_deliveries(notification_id, user_id)
        .await?;

    Ok(Json(attempts))
}

/// Delete a notification
#[utoipa::path(
    delete,
    path = "/api/users/{user_id}/notifications/{id}",
    params(
        ("user_id" = Uuid, Path, description = "Recipient user ID"),
        ("id" = Uuid, Path, description = "Notification ID")
    ),
    responses(
        (status = 204, description = "Notification deleted"),
        (status = 404, description = "Notification not found")
    ),
    tag = "notifications"
)]
pub async fn delete_notification(
    State(state): State<AppState>,
    Path((user_id, notification_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state
        .notification_service
        .delete_notification(notification_id, user_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Run one sweep over due deferred and retry notifications
#[utoipa::path(
    post,
    path = "/api/maintenance/process-scheduled",
    responses(
        (status = 200, description = "Sweep report", body = SweepReport),
        (status = 409, description = "A sweep is already running")
    ),
    tag = "maintenance"
)]
pub async fn process_scheduled(State(state): State<AppState>) -> Result<(StatusCode, Json<SweepReport>)> {
    match state
        .notification_service
        .process_scheduled_notifications(Utc::now())
        .await?
    {
        Some(report) => Ok((StatusCode::OK, Json(report))),
        None => Ok((StatusCode::CONFLICT, Json(SweepReport::default()))),
    }
}

/// Delete notifications past their expiry
#[utoipa::path(
    post,
    path = "/api/maintenance/cleanup-expired",
    responses(
        (status = 200, description = "Number of notifications deleted", body = CleanupResponse)
    ),
    tag = "maintenance"
)]
pub async fn cleanup_expired(State(state): State<AppState>) -> Result<Json<CleanupResponse>> {
    let deleted = state
        .notification_service
        .cleanup_expired_notifications(Utc::now())
        .await?;

    Ok(Json(CleanupResponse { deleted }))
}
