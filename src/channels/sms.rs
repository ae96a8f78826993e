use async_trait::async_trait;
use serde_json::json;

use super::{ChannelError, ChannelSender, GatewayClient, RenderedContent};
use crate::device::Contact;
use crate::notification::Channel;

#[derive(Debug, Clone)]
pub struct SmsGatewayConfig {
    pub url: String,
    pub api_key: Option<String>,
}

impl SmsGatewayConfig {
    /// Returns `None` when `SMS_GATEWAY_URL` is unset.
    pub fn from_env() -> Option<Self> {
        Some(Self {
            url: std::env::var("SMS_GATEWAY_URL").ok()?,
            api_key: std::env::var("SMS_GATEWAY_KEY").ok(),
        })
    }
}

pub struct SmsSender {
    gateway: GatewayClient,
}

impl SmsSender {
    pub fn new(config: SmsGatewayConfig) -> Result<Self, ChannelError> {
        Ok(Self {
            gateway: GatewayClient::new(config.url, config.api_key)?,
        })
    }
}

fn sms_text(content: &RenderedContent) -> String {
    format!("{}: {}", content.title, content.body)
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, contact: &Contact, content: &RenderedContent) -> Result<(), ChannelError> {
        let phone = contact
            .phone
            .as_deref()
            .ok_or(ChannelError::NoContact(Channel::Sms))?;

        let payload = json!({
            "to": phone,
            "message": sms_text(content),
            "reference": content.notification_id,
        });
        self.gateway.post_json(&payload).await?;

        tracing::debug!(notification_id = %content.notification_id, "SMS sent");
        Ok(())
    }
}
