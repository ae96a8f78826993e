use async_trait::async_trait;
use serde_json::json;

use super::{ChannelError, ChannelSender, GatewayClient, RenderedContent};
use crate::device::Contact;
use crate::notification::Channel;

#[derive(Debug, Clone)]
pub struct PushGatewayConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl PushGatewayConfig {
    /// Returns `None` when `PUSH_GATEWAY_URL` is unset.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            url: std::env::var("PUSH_GATEWAY_URL").ok()?,
            api_key: std::env::var("PUSH_GATEWAY_KEY").ok(),
        })
    }
}

/// Sends to every active device token through one gateway call.
pub struct PushSender {
    gateway: GatewayClient,
}

impl PushSender {
    pub fn new(config: PushGatewayConfig) -> Result<Self, ChannelError> {
        Ok(Self {
            gateway: GatewayClient::new(config.url, config.api_key)?,
        })
    }
}

#[async_trait]
impl ChannelSender for PushSender {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, contact: &Contact, content: &RenderedContent) -> Result<(), ChannelError> {
        if contact.push_tokens.is_empty() {
            return Err(ChannelError::NoContact(Channel::Push));
        }

        let payload = json!({
            "tokens": contact.push_tokens,
            "notification": {
                "title": content.title,
                "body": content.body,
            },
            "data": content.data,
            "priority": content.priority,
            "notification_id": content.notification_id,
            "type": content.notification_type,
        });
        self.gateway.post_json(&payload).await?;

        tracing::debug!(
            notification_id = %content.notification_id,
            tokens = contact.push_tokens.len(),
            "Push notification sent"
        );
        Ok(())
    }
}
