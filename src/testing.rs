//! Fakes and builders shared by the unit tests.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::channels::{ChannelError, ChannelSender, RenderedContent};
use crate::delivery::{BatchCoordinator, DeliveryPipeline, Dispatcher, SweepConfig, Sweeper};
use crate::device::{Contact, InMemoryDeviceRepository, InMemoryUserDirectory, UserDirectory};
use crate::error::{AppError, Result};
use crate::notification::{
    Channel, InMemoryNotificationRepository, NewNotification, Notification, NotificationService,
    NotificationTemplate, NotificationType, Priority, SendNotificationRequest,
};
use crate::preference::{InMemoryPreferenceRepository, PreferenceResolver};
use crate::state::{AppState, Config, Repositories};

/// Counts calls and succeeds or fails on demand.
pub struct RecordingSender {
    channel: Channel,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingSender {
    pub fn succeeding(channel: Channel) -> Arc<Self> {
        Arc::new(Self {
            channel,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay: None,
        })
    }

    /// Succeeds after holding each send for `delay`.
    pub fn slow(channel: Channel, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            channel,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            delay: Some(delay),
        })
    }

    pub fn failing(channel: Channel) -> Arc<Self> {
        let sender = Self::succeeding(channel);
        sender.set_failing(true);
        sender
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelSender for RecordingSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, _contact: &Contact, _content: &RenderedContent) -> std::result::Result<(), ChannelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Let concurrent sends interleave.
        match self.delay {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::HttpStatus(503));
        }
        Ok(())
    }
}

pub struct FailingDirectory;

#[async_trait]
impl UserDirectory for FailingDirectory {
    async fn contact(&self, _user_id: Uuid) -> Result<Contact> {
        Err(AppError::InternalError)
    }
}

pub fn new_notification(notification_type: NotificationType) -> NewNotification {
    NewNotification {
        user_id: Uuid::new_v4(),
        notification_type,
        title: "Order update".into(),
        body: "Something happened to your order".into(),
        payload: None,
        channels: vec![Channel::Push, Channel::InApp],
        priority: Priority::Normal,
        expires_at: None,
        scheduled_for: None,
        batch_id: None,
        template_id: None,
    }
}

pub fn sample_notification() -> Notification {
    new_notification(NotificationType::OrderConfirmation).into_notification(Uuid::new_v4(), Utc::now())
}

pub fn template(notification_type: NotificationType) -> NotificationTemplate {
    NotificationTemplate {
        notification_type,
        title: "Weekend sale".into(),
        message: "Everything 20% off".into(),
        payload: None,
        channels: None,
        priority: None,
        template_id: None,
        scheduled_for: None,
        expires_at: None,
    }
}

pub fn send_request(recipients: serde_json::Value) -> SendNotificationRequest {
    serde_json::from_value(serde_json::json!({
        "recipients": recipients,
        "type": "ORDER_CONFIRMATION",
        "title": "Order confirmed",
        "message": "Order #1042 is confirmed",
    }))
    .unwrap()
}

/// Engine over in-memory stores with a recording PUSH sender. IN_APP has no
/// sender registered, so it always succeeds.
pub struct TestEngine {
    pub repo: Arc<InMemoryNotificationRepository>,
    pub prefs: Arc<InMemoryPreferenceRepository>,
    pub push: Arc<RecordingSender>,
    pub pipeline: DeliveryPipeline,
    pub coordinator: BatchCoordinator,
    pub sweeper: Sweeper,
    pub service: NotificationService,
}

impl TestEngine {
    pub fn new() -> Self {
        Self::with_chunk_size(100)
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self::build(RecordingSender::succeeding(Channel::Push), chunk_size, Config::default().lease())
    }

    /// Engine around a given PUSH sender, with `lease` for both the initial
    /// pass and the sweep.
    pub fn build(push: Arc<RecordingSender>, chunk_size: usize, lease: chrono::Duration) -> Self {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let prefs = Arc::new(InMemoryPreferenceRepository::new());
        let directory = Arc::new(InMemoryUserDirectory::new(Arc::new(InMemoryDeviceRepository::new())));

        let dispatcher = Dispatcher::new(directory).with_sender(push.clone());
        let pipeline = DeliveryPipeline::new(
            repo.clone(),
            PreferenceResolver::new(prefs.clone()),
            Arc::new(dispatcher),
        );
        let coordinator = BatchCoordinator::new(repo.clone(), pipeline.clone(), chunk_size, lease);
        let sweeper = Sweeper::new(repo.clone(), pipeline.clone(), SweepConfig {
            concurrency: 4,
            lease,
            ..Config::default().sweep_config()
        });
        let service = NotificationService::new(repo.clone(), coordinator.clone(), sweeper.clone());

        Self {
            repo,
            prefs,
            push,
            pipeline,
            coordinator,
            sweeper,
            service,
        }
    }
}

/// Full application state over in-memory stores and no external senders.
pub fn test_state() -> AppState {
    let config = Config {
        storage: crate::state::StorageBackend::Memory,
        ..Config::default()
    };
    AppState::new(&config, Repositories::in_memory(), Vec::new())
}
