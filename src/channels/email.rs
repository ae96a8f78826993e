use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{ChannelError, ChannelSender, RenderedContent};
use crate::device::Contact;
use crate::notification::Channel;
use crate::state::env_or;

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default sender address when `SMTP_FROM` is not set.
const DEFAULT_FROM_ADDRESS: &str = "noreply@notifications.local";

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// Returns `None` if `SMTP_HOST` is not set, meaning no email sender is
    /// registered. A malformed `SMTP_PORT` is an error.
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        let Ok(smtp_host) = std::env::var("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: env_or("SMTP_PORT", DEFAULT_SMTP_PORT)?,
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        }))
    }
}

pub struct EmailSender {
    from: Mailbox,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailSender {
    pub fn new(config: EmailConfig) -> Result<Self, ChannelError> {
        let from: Mailbox = config.from_address.parse()?;

        let mut transport_builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
                .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (config.smtp_user, config.smtp_password) {
            transport_builder = transport_builder.credentials(Credentials::new(user, pass));
        }

        Ok(Self {
            from,
            mailer: transport_builder.build(),
        })
    }
}

fn build_message(from: &Mailbox, to: &str, content: &RenderedContent) -> Result<Message, ChannelError> {
    Message::builder()
        .from(from.clone())
        .to(to.parse()?)
        .subject(content.title.clone())
        .header(ContentType::TEXT_PLAIN)
        .body(content.body.clone())
        .map_err(|e| ChannelError::Build(e.to_string()))
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, contact: &Contact, content: &RenderedContent) -> Result<(), ChannelError> {
        let to = contact
            .email
            .as_deref()
            .ok_or(ChannelError::NoContact(Channel::Email))?;

        let message = build_message(&self.from, to, content)?;
        self.mailer.send(message).await?;

        tracing::info!(
            notification_id = %content.notification_id,
            notification_type = %content.notification_type,
            "Notification email sent"
        );
        Ok(())
    }
}
