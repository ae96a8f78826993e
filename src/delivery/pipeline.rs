use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use super::dispatcher::{is_delivered, Dispatcher};
use super::retry::{RetryDecision, RetryManager};
use super::scheduler::{schedule, Decision};
use crate::error::Result;
use crate::notification::{Notification, NotificationRepository};
use crate::preference::{filter_channels, NotificationPreferences, PreferenceResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Delivered,
    Deferred(DateTime<Utc>),
    Retrying(DateTime<Utc>),
    Failed,
    Expired,
    /// Not pending, or another worker won the transition.
    Skipped,
}

/// Tally of pipeline results across a batch or a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct OutcomeCounts {
    pub delivered: usize,
    pub deferred: usize,
    pub retrying: usize,
    pub failed: usize,
    pub expired: usize,
    pub skipped: usize,
    /// Attempts that hit a storage error; the record is left for the sweep.
    pub errored: usize,
}

impl OutcomeCounts {
    pub fn record(&mut self, result: &Result<PipelineOutcome>) {
        match result {
            Ok(PipelineOutcome::Delivered) => self.delivered += 1,
            Ok(PipelineOutcome::Deferred(_)) => self.deferred += 1,
            Ok(PipelineOutcome::Retrying(_)) => self.retrying += 1,
            Ok(PipelineOutcome::Failed) => self.failed += 1,
            Ok(PipelineOutcome::Expired) => self.expired += 1,
            Ok(PipelineOutcome::Skipped) => self.skipped += 1,
            Err(_) => self.errored += 1,
        }
    }
}

/// One delivery attempt for one record: preferences, channel filter,
/// scheduling decision, dispatch, then the resulting state transition.
#[derive(Clone)]
pub struct DeliveryPipeline {
    repo: Arc<dyn NotificationRepository>,
    resolver: PreferenceResolver,
    dispatcher: Arc<Dispatcher>,
    retry: RetryManager,
}

impl DeliveryPipeline {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        resolver: PreferenceResolver,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            retry: RetryManager::new(repo.clone()),
            repo,
            resolver,
            dispatcher,
        }
    }

    pub async fn process(&self, notification: &Notification, now: DateTime<Utc>) -> Result<PipelineOutcome> {
        if !notification.is_pending() {
            return Ok(PipelineOutcome::Skipped);
        }

        let prefs = self.resolver.resolve(notification.user_id).await;

        match schedule(notification, &prefs, now) {
            Decision::Expire => {
                if !self.repo.mark_expired(notification.id).await? {
                    return Ok(PipelineOutcome::Skipped);
                }
                tracing::info!(notification_id = %notification.id, "Notification expired before delivery");
                Ok(PipelineOutcome::Expired)
            }
            Decision::Defer(until) => {
                if !self.repo.defer(notification.id, until).await? {
                    return Ok(PipelineOutcome::Skipped);
                }
                tracing::debug!(notification_id = %notification.id, %until, "Notification deferred");
                Ok(PipelineOutcome::Deferred(until))
            }
            Decision::SendNow => self.send(notification, &prefs, now).await,
        }
    }

    async fn send(
        &self,
        notification: &Notification,
        prefs: &NotificationPreferences,
        now: DateTime<Utc>,
    ) -> Result<PipelineOutcome> {
        let channels = filter_channels(&notification.channels, notification.notification_type, prefs);
        let outcomes = self.dispatcher.dispatch(notification, &channels).await;

        if let Err(e) = self.repo.record_outcomes(notification.id, &outcomes, now).await {
            tracing::warn!(notification_id = %notification.id, error = %e, "Failed to record delivery outcomes");
        }

        if is_delivered(&outcomes) {
            if !self.repo.mark_sent(notification.id, now).await? {
                return Ok(PipelineOutcome::Skipped);
            }
            tracing::info!(
                notification_id = %notification.id,
                user_id = %notification.user_id,
                channels = outcomes.iter().filter(|o| o.success).count(),
                "Notification delivered"
            );
            return Ok(PipelineOutcome::Delivered);
        }

        if channels.is_empty() {
            tracing::warn!(notification_id = %notification.id, "No channel left after preference filtering");
        }

        Ok(match self.retry.on_failure(notification, now).await? {
            Some(RetryDecision::Retry { next_attempt_at, .. }) => PipelineOutcome::Retrying(next_attempt_at),
            Some(RetryDecision::Exhausted { .. }) => PipelineOutcome::Failed,
            None => PipelineOutcome::Skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{Channel, NotificationStatus, NotificationType, Priority};
    use crate::preference::PreferenceRepository;
    use crate::testing::{new_notification, TestEngine};
    use chrono::{Duration, NaiveTime};

    #[tokio::test]
    async fn test_delivers_and_records_outcomes() {
        let engine = TestEngine::new();
        let now = Utc::now();
        let n = engine
            .repo
            .create(new_notification(NotificationType::OrderShipped), None)
            .await
            .unwrap();

        let outcome = engine.pipeline.process(&n, now).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Delivered);

        let stored = engine.repo.find_by_id(n.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Sent);
        assert!(stored.is_sent);
        assert_eq!(stored.sent_at, Some(now));

        let attempts = engine.repo.find_deliveries(n.id).await.unwrap();
        assert_eq!(attempts.len(), 2);
        assert!(attempts.iter().all(|a| a.success));

        // A second pass over the same snapshot must not re-send.
        assert_eq!(engine.pipeline.process(&stored, now).await.unwrap(), PipelineOutcome::Skipped);
        assert_eq!(engine.push.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_channels_failing_schedules_retry() {
        let engine = TestEngine::new();
        engine.push.set_failing(true);
        let now = Utc::now();

        let mut new = new_notification(NotificationType::OrderShipped);
        new.channels = vec![Channel::Push];
        let n = engine.repo.create(new, None).await.unwrap();

        let outcome = engine.pipeline.process(&n, now).await.unwrap();
        assert_eq!(outcome, PipelineOutcome::Retrying(now + Duration::minutes(2)));

        let stored = engine.repo.find_by_id(n.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Pending);
        assert_eq!(stored.retry_count, 1);
    }

    #[tokio::test]
    async fn test_payment_failed_gives_up_after_five_attempts() {
        let engine = TestEngine::new();
        engine.push.set_failing(true);

        let mut new = new_notification(NotificationType::PaymentFailed);
        new.channels = vec![Channel::Push];
        let created = engine.repo.create(new, None).await.unwrap();

        let mut now = Utc::now();
        let mut outcomes = Vec::new();
        for _ in 0..5 {
            let current = engine.repo.find_by_id(created.id).await.unwrap().unwrap();
            let outcome = engine.pipeline.process(&current, now).await.unwrap();
            outcomes.push(outcome);
            now += Duration::hours(2);
        }

        assert!(outcomes[..4]
            .iter()
            .all(|o| matches!(o, PipelineOutcome::Retrying(_))));
        assert_eq!(outcomes[4], PipelineOutcome::Failed);

        let stored = engine.repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert_eq!(stored.retry_count, 5);
        assert_eq!(engine.push.calls(), 5);
    }

    #[tokio::test]
    async fn test_quiet_hours_defer_without_dispatch() {
        let engine = TestEngine::new();
        let n = engine
            .repo
            .create(new_notification(NotificationType::Promotion), None)
            .await
            .unwrap();

        let mut prefs = NotificationPreferences::defaults(n.user_id);
        prefs.quiet_hours_enabled = true;
        prefs.quiet_hours_start = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        prefs.quiet_hours_end = NaiveTime::from_hms_opt(23, 59, 0).unwrap();
        engine.prefs.upsert(&prefs).await.unwrap();

        let now = DateTime::parse_from_rfc3339("2024-05-10T12:00:00Z").unwrap().with_timezone(&Utc);
        let outcome = engine.pipeline.process(&n, now).await.unwrap();
        let until = DateTime::parse_from_rfc3339("2024-05-10T23:59:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(outcome, PipelineOutcome::Deferred(until));
        assert_eq!(engine.push.calls(), 0);

        let stored = engine.repo.find_by_id(n.id).await.unwrap().unwrap();
        assert_eq!(stored.scheduled_for, Some(until));
        assert!(stored.is_pending());
    }

    #[tokio::test]
    async fn test_urgent_ignores_quiet_hours() {
        let engine = TestEngine::new();
        let mut new = new_notification(NotificationType::SecurityAlert);
        new.priority = Priority::Urgent;
        let n = engine.repo.create(new, None).await.unwrap();

        let mut prefs = NotificationPreferences::defaults(n.user_id);
        prefs.quiet_hours_enabled = true;
        prefs.quiet_hours_start = NaiveTime::from_hms_opt(0, 0, 0).unwrap();
        prefs.quiet_hours_end = NaiveTime::from_hms_opt(23, 59, 0).unwrap();
        engine.prefs.upsert(&prefs).await.unwrap();

        let now = DateTime::parse_from_rfc3339("2024-05-10T12:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(engine.pipeline.process(&n, now).await.unwrap(), PipelineOutcome::Delivered);
    }

    #[tokio::test]
    async fn test_expired_record_is_not_dispatched() {
        let engine = TestEngine::new();
        let now = Utc::now();
        let mut new = new_notification(NotificationType::PriceDrop);
        new.expires_at = Some(now - Duration::minutes(1));
        let n = engine.repo.create(new, None).await.unwrap();

        assert_eq!(engine.pipeline.process(&n, now).await.unwrap(), PipelineOutcome::Expired);
        assert_eq!(engine.push.calls(), 0);

        let stored = engine.repo.find_by_id(n.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Expired);
    }

    #[tokio::test]
    async fn test_disabled_channels_leave_nothing_to_send() {
        let engine = TestEngine::new();
        let mut new = new_notification(NotificationType::Promotion);
        new.channels = vec![Channel::Sms];
        let n = engine.repo.create(new, None).await.unwrap();

        // SMS is off by default, so nothing is dispatched and the attempt counts as failed.
        let outcome = engine.pipeline.process(&n, Utc::now()).await.unwrap();
        assert!(matches!(outcome, PipelineOutcome::Retrying(_)));
        assert!(engine.repo.find_deliveries(n.id).await.unwrap().is_empty());
    }
}
