//! Outbound delivery channels.
//!
//! Each external channel is a [`ChannelSender`]; the dispatcher holds one per
//! configured channel. Provider specifics stay behind the gateway endpoints
//! the senders post to.

pub mod email;
pub mod in_app;
pub mod push;
pub mod sms;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::device::Contact;
use crate::notification::{Channel, Notification, NotificationType, Priority};

pub use email::{EmailConfig, EmailSender};
pub use in_app::{InAppEvent, InAppSender};
pub use push::{PushGatewayConfig, PushSender};
pub use sms::{SmsGatewayConfig, SmsSender};

/// HTTP request timeout for a single gateway call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("No {0} contact for recipient")]
    NoContact(Channel),

    #[error("No sender configured for {0}")]
    NotConfigured(Channel),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gateway returned HTTP {0}")]
    HttpStatus(u16),

    #[error("SMTP transport error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Email build error: {0}")]
    Build(String),

    #[error("Directory lookup failed: {0}")]
    Directory(String),
}

/// Content handed to a sender, taken as-is from the stored record.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedContent {
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub priority: Priority,
    pub title: String,
    pub body: String,
    pub data: Option<serde_json::Value>,
    pub template_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl RenderedContent {
    pub fn from_notification(notification: &Notification) -> Self {
        Self {
            notification_id: notification.id,
            user_id: notification.user_id,
            notification_type: notification.notification_type,
            priority: notification.priority,
            title: notification.title.clone(),
            body: notification.body.clone(),
            data: notification.payload.as_ref().map(|p| p.0.clone()),
            template_id: notification.template_id.clone(),
            created_at: notification.created_at,
        }
    }
}

#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    async fn send(&self, contact: &Contact, content: &RenderedContent) -> Result<(), ChannelError>;
}

/// JSON-over-HTTP client shared by the gateway-backed senders.
#[derive(Clone)]
pub(crate) struct GatewayClient {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl GatewayClient {
    pub(crate) fn new(url: String, api_key: Option<String>) -> Result<Self, ChannelError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, url, api_key })
    }

    /// Execute a single POST request and check the response status.
    pub(crate) async fn post_json(&self, payload: &serde_json::Value) -> Result<(), ChannelError> {
        let mut request = self.client.post(&self.url).json(payload);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ChannelError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}
