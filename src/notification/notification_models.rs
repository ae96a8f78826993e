use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use utoipa::ToSchema;
use uuid::Uuid;

/// Closed set of notification kinds the platform emits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    OrderConfirmation,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
    PaymentSuccess,
    PaymentFailed,
    SecurityAlert,
    AccountUpdate,
    PriceDrop,
    Promotion,
    System,
}

impl NotificationType {
    /// Retry budget for a notification of this type.
    pub fn max_retries(self) -> i32 {
        match self {
            NotificationType::SecurityAlert
            | NotificationType::PaymentFailed
            | NotificationType::OrderCancelled => 5,
            NotificationType::OrderConfirmation
            | NotificationType::OrderShipped
            | NotificationType::OrderDelivered
            | NotificationType::PaymentSuccess
            | NotificationType::AccountUpdate
            | NotificationType::PriceDrop
            | NotificationType::Promotion
            | NotificationType::System => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationType::OrderConfirmation => "ORDER_CONFIRMATION",
            NotificationType::OrderShipped => "ORDER_SHIPPED",
            NotificationType::OrderDelivered => "ORDER_DELIVERED",
            NotificationType::OrderCancelled => "ORDER_CANCELLED",
            NotificationType::PaymentSuccess => "PAYMENT_SUCCESS",
            NotificationType::PaymentFailed => "PAYMENT_FAILED",
            NotificationType::SecurityAlert => "SECURITY_ALERT",
            NotificationType::AccountUpdate => "ACCOUNT_UPDATE",
            NotificationType::PriceDrop => "PRICE_DROP",
            NotificationType::Promotion => "PROMOTION",
            NotificationType::System => "SYSTEM",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_uppercase()))
            .map_err(|_| format!("Unknown notification type: {}", s))
    }
}

/// Delivery mechanism.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Push,
    Email,
    Sms,
    InApp,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Push => write!(f, "PUSH"),
            Channel::Email => write!(f, "EMAIL"),
            Channel::Sms => write!(f, "SMS"),
            Channel::InApp => write!(f, "IN_APP"),
        }
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Stored lifecycle state. A deferred notification is `Pending` with a
/// future `scheduled_for`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "text", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Expired,
    Failed,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationStatus::Pending => write!(f, "PENDING"),
            NotificationStatus::Sent => write!(f, "SENT"),
            NotificationStatus::Expired => write!(f, "EXPIRED"),
            NotificationStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    #[schema(value_type = Option<Object>)]
    pub payload: Option<Json<serde_json::Value>>,
    #[schema(value_type = Vec<Channel>)]
    pub channels: Json<Vec<Channel>>,
    pub priority: Priority,
    pub status: NotificationStatus,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub is_sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub batch_id: Option<Uuid>,
    pub template_id: Option<String>,
    #[serde(skip_serializing)]
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Notification {
    /// Still eligible for a dispatch attempt.
    pub fn is_pending(&self) -> bool {
        self.status == NotificationStatus::Pending && !self.is_sent
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// Insert payload for a single recipient's record.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    pub payload: Option<serde_json::Value>,
    pub channels: Vec<Channel>,
    pub priority: Priority,
    pub expires_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub batch_id: Option<Uuid>,
    pub template_id: Option<String>,
}

impl NewNotification {
    pub fn into_notification(self, id: Uuid, now: DateTime<Utc>) -> Notification {
        Notification {
            id,
            user_id: self.user_id,
            notification_type: self.notification_type,
            title: self.title,
            body: self.body,
            payload: self.payload.map(Json),
            channels: Json(self.channels),
            priority: self.priority,
            status: NotificationStatus::Pending,
            is_read: false,
            read_at: None,
            is_sent: false,
            sent_at: None,
            expires_at: self.expires_at,
            scheduled_for: self.scheduled_for,
            retry_count: 0,
            max_retries: self.notification_type.max_retries(),
            batch_id: self.batch_id,
            template_id: self.template_id,
            locked_until: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of one channel's send attempt within a dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ChannelOutcome {
    pub channel: Channel,
    pub success: bool,
    pub error: Option<String>,
}

impl ChannelOutcome {
    pub fn delivered(channel: Channel) -> Self {
        Self {
            channel,
            success: true,
            error: None,
        }
    }

    pub fn failed(channel: Channel, error: impl Into<String>) -> Self {
        Self {
            channel,
            success: false,
            error: Some(error.into()),
        }
    }
}
