use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;

use crate::channels::{ChannelError, ChannelSender, RenderedContent};
use crate::device::{Contact, UserDirectory};
use crate::notification::{Channel, ChannelOutcome, Notification};

/// Fans one notification out to its effective channels.
///
/// A failing channel never affects the others; every requested channel gets
/// exactly one outcome, in request order.
pub struct Dispatcher {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
    directory: Arc<dyn UserDirectory>,
}

impl Dispatcher {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            senders: HashMap::new(),
            directory,
        }
    }

    /// Registers `sender` for the channel it reports, replacing any earlier one.
    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }

    pub async fn dispatch(&self, notification: &Notification, channels: &[Channel]) -> Vec<ChannelOutcome> {
        let content = RenderedContent::from_notification(notification);

        let contact = if channels.iter().any(|c| *c != Channel::InApp) {
            self.directory
                .contact(notification.user_id)
                .await
                .map_err(|e| e.to_string())
        } else {
            Ok(Contact::default())
        };

        let sends = channels
            .iter()
            .map(|&channel| self.send_one(channel, &contact, &content));
        join_all(sends).await
    }

    async fn send_one(
        &self,
        channel: Channel,
        contact: &std::result::Result<Contact, String>,
        content: &RenderedContent,
    ) -> ChannelOutcome {
        let result = match (channel, self.senders.get(&channel)) {
            // The stored record is already visible in the inbox.
            (Channel::InApp, None) => Ok(()),
            (_, None) => Err(ChannelError::NotConfigured(channel)),
            (_, Some(sender)) => match contact {
                Ok(contact) => sender.send(contact, content).await,
                Err(e) if channel != Channel::InApp => Err(ChannelError::Directory(e.clone())),
                Err(_) => sender.send(&Contact::default(), content).await,
            },
        };

        match result {
            Ok(()) => {
                tracing::debug!(notification_id = %content.notification_id, %channel, "Channel delivered");
                ChannelOutcome::delivered(channel)
            }
            Err(e) => {
                tracing::warn!(
                    notification_id = %content.notification_id,
                    %channel,
                    error = %e,
                    "Channel delivery failed"
                );
                ChannelOutcome::failed(channel, e.to_string())
            }
        }
    }
}

/// Delivered when at least one channel succeeded.
pub fn is_delivered(outcomes: &[ChannelOutcome]) -> bool {
    outcomes.iter().any(|o| o.success)
}
