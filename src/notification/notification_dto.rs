use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::notification_models::{Channel, NewNotification, Notification, NotificationType, Priority};

/// Channels used when a request names none.
pub const DEFAULT_CHANNELS: [Channel; 2] = [Channel::Push, Channel::InApp];

/// A single recipient id or a list of them.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Recipients {
    One(Uuid),
    Many(Vec<Uuid>),
}

impl Recipients {
    pub fn into_vec(self) -> Vec<Uuid> {
        match self {
            Recipients::One(id) => vec![id],
            Recipients::Many(ids) => ids,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct SendNotificationRequest {
    pub recipients: Recipients,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
    #[schema(value_type = Option<Object>)]
    pub payload: Option<serde_json::Value>,
    pub channels: Option<Vec<Channel>>,
    pub priority: Option<Priority>,
    #[validate(length(min = 1, max = 100))]
    pub template_id: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Content shared by every recipient of a bulk send.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NotificationTemplate {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
    #[schema(value_type = Option<Object>)]
    pub payload: Option<serde_json::Value>,
    pub channels: Option<Vec<Channel>>,
    pub priority: Option<Priority>,
    #[validate(length(min = 1, max = 100))]
    pub template_id: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SendNotificationRequest {
    /// Splits the request into its recipient list and the shared content.
    pub fn into_parts(self) -> (Vec<Uuid>, NotificationTemplate) {
        (
            self.recipients.into_vec(),
            NotificationTemplate {
                notification_type: self.notification_type,
                title: self.title,
                message: self.message,
                payload: self.payload,
                channels: self.channels,
                priority: self.priority,
                template_id: self.template_id,
                scheduled_for: self.scheduled_for,
                expires_at: self.expires_at,
            },
        )
    }
}

impl NotificationTemplate {
    /// Record for one recipient, applying the channel and priority defaults.
    pub fn for_recipient(&self, user_id: Uuid, batch_id: Option<Uuid>) -> NewNotification {
        NewNotification {
            user_id,
            notification_type: self.notification_type,
            title: self.title.clone(),
            body: self.message.clone(),
            payload: self.payload.clone(),
            channels: self
                .channels
                .clone()
                .unwrap_or_else(|| DEFAULT_CHANNELS.to_vec()),
            priority: self.priority.unwrap_or_default(),
            expires_at: self.expires_at,
            scheduled_for: self.scheduled_for,
            batch_id,
            template_id: self.template_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BulkNotificationRequest {
    pub recipient_ids: Vec<Uuid>,
    pub template: NotificationTemplate,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NotificationQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub unread_only: Option<bool>,
    /// Comma-separated notification types
    pub types: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationListResponse {
    pub data: Vec<Notification>,
    pub total: i64,
    pub unread_count: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CleanupResponse {
    pub deleted: u64,
}
