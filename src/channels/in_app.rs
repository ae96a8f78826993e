use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{ChannelError, ChannelSender, RenderedContent};
use crate::device::Contact;
use crate::notification::Channel;

/// Live event pushed to the recipient's open SSE streams.
#[derive(Debug, Clone, Serialize)]
pub struct InAppEvent {
    pub user_id: Uuid,
    pub notification: RenderedContent,
}

/// The stored record is the in-app notification; this only announces it to
/// connected clients and never fails.
#[derive(Clone)]
pub struct InAppSender {
    tx: broadcast::Sender<InAppEvent>,
}

impl InAppSender {
    pub fn new(tx: broadcast::Sender<InAppEvent>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ChannelSender for InAppSender {
    fn channel(&self) -> Channel {
        Channel::InApp
    }

    async fn send(&self, _contact: &Contact, content: &RenderedContent) -> Result<(), ChannelError> {
        // No subscribers is fine.
        let _ = self.tx.send(InAppEvent {
            user_id: content.user_id,
            notification: content.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_notification;

    #[tokio::test]
    async fn test_announces_to_subscribers() {
        let (tx, mut rx) = broadcast::channel(4);
        let sender = InAppSender::new(tx);
        let n = sample_notification();

        let content = RenderedContent::from_notification(&n);
        sender.send(&Contact::default(), &content).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.user_id, n.user_id);
        assert_eq!(event.notification.notification_id, n.id);
    }

    #[tokio::test]
    async fn test_no_subscribers_still_succeeds() {
        let (tx, _) = broadcast::channel(4);
        let sender = InAppSender::new(tx);
        let content = RenderedContent::from_notification(&sample_notification());
        assert!(sender.send(&Contact::default(), &content).await.is_ok());
    }
}
