use crate::{
    delivery::{BatchSummary, OutcomeCounts, SweepReport},
    device::{self, Device, DeviceInfo, RegisterDeviceRequest},
    notification::{
        self, BulkNotificationRequest, Channel, CleanupResponse, DeliveryAttempt, MarkAllReadResponse,
        Notification, NotificationListResponse, NotificationStatus, NotificationTemplate, NotificationType,
        Priority, Recipients, SendNotificationRequest,
    },
    preference::{self, NotificationPreferences, QuietHoursUpdate, UpdatePreferencesRequest},
    state::AppState,
};
use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        notification::notification_handlers::send_notification,
        notification::notification_handlers::send_bulk_notification,
        notification::notification_handlers::get_notifications,
        notification::notification_handlers::notification_stream,
        notification::notification_handlers::mark_notification_read,
        notification::notification_handlers::mark_all_notifications_read,
        notification::notification_handlers::get_notification_deliveries,
        notification::notification_handlers::delete_notification,
        notification::notification_handlers::process_scheduled,
        notification::notification_handlers::cleanup_expired,
        preference::preference_handlers::get_preferences,
        preference::preference_handlers::update_preferences,
        device::device_handlers::register_device,
        device::device_handlers::unregister_device,
    ),
    components(
        schemas(
            SendNotificationRequest,
            BulkNotificationRequest,
            NotificationTemplate,
            Recipients,
            BatchSummary,
            OutcomeCounts,
            SweepReport,
            NotificationListResponse,
            MarkAllReadResponse,
            CleanupResponse,
            Notification,
            NotificationType,
            NotificationStatus,
            Channel,
            Priority,
            DeliveryAttempt,
            NotificationPreferences,
            UpdatePreferencesRequest,
            QuietHoursUpdate,
            RegisterDeviceRequest,
            DeviceInfo,
            Device,
        )
    ),
    tags(
        (name = "notifications", description = "Sending and reading notifications"),
        (name = "preferences", description = "Per-user channel and quiet-hours settings"),
        (name = "devices", description = "Push device registration"),
        (name = "maintenance", description = "Sweep and cleanup triggers")
    )
)]
struct ApiDoc;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let notification_routes = Router::new()
        .route("/", post(notification::send_notification))
        .route("/bulk", post(notification::send_bulk_notification));

    let user_routes = Router::new()
        .route("/:user_id/notifications", get(notification::get_notifications))
        .route("/:user_id/notifications/stream", get(notification::notification_stream))
        .route(
            "/:user_id/notifications/read-all",
            patch(notification::mark_all_notifications_read),
        )
        .route("/:user_id/notifications/:id", delete(notification::delete_notification))
        .route("/:user_id/notifications/:id/read", patch(notification::mark_notification_read))
        .route(
            "/:user_id/notifications/:id/deliveries",
            get(notification::get_notification_deliveries),
        )
        .route(
            "/:user_id/preferences",
            get(preference::get_preferences).put(preference::update_preferences),
        )
        .route("/:user_id/devices", post(device::register_device))
        .route("/:user_id/devices/:device_id", delete(device::unregister_device));

    let maintenance_routes = Router::new()
        .route("/process-scheduled", post(notification::process_scheduled))
        .route("/cleanup-expired", post(notification::cleanup_expired));

    // Combine all routes
    let api_routes = Router::new()
        .nest("/notifications", notification_routes)
        .nest("/users", user_routes)
        .nest("/maintenance", maintenance_routes);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
