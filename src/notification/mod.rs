pub mod notification_dto;
pub mod notification_handlers;
pub mod notification_models;
pub mod notification_repository;
pub mod notification_service;

pub use notification_dto::{
    BulkNotificationRequest, CleanupResponse, MarkAllReadResponse, NotificationListResponse,
    NotificationTemplate, Recipients, SendNotificationRequest,
};
pub use notification_handlers::{
    cleanup_expired, delete_notification, get_notification_deliveries, get_notifications,
    mark_all_notifications_read, mark_notification_read, notification_stream, process_scheduled,
    send_bulk_notification, send_notification,
};
pub use notification_models::{
    Channel, ChannelOutcome, NewNotification, Notification, NotificationStatus, NotificationType,
    Priority,
};
pub use notification_repository::{
    DeliveryAttempt, InMemoryNotificationRepository, NotificationRepository, PgNotificationRepository,
};
pub use notification_service::NotificationService;
