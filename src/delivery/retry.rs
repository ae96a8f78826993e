use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::error::Result;
use crate::notification::{Notification, NotificationRepository};

/// Exponent cap so the delay stays representable.
const MAX_BACKOFF_EXPONENT: i32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry {
        retry_count: i32,
        next_attempt_at: DateTime<Utc>,
    },
    Exhausted {
        retry_count: i32,
    },
}

/// `2^attempt` minutes.
pub fn backoff_delay(attempt: i32) -> Duration {
    Duration::minutes(1_i64 << attempt.clamp(0, MAX_BACKOFF_EXPONENT))
}

/// Next step after an attempt in which no channel succeeded.
pub fn next_retry(notification: &Notification, now: DateTime<Utc>) -> RetryDecision {
    let retry_count = (notification.retry_count + 1).min(notification.max_retries);
    if retry_count < notification.max_retries {
        RetryDecision::Retry {
            retry_count,
            next_attempt_at: now + backoff_delay(retry_count),
        }
    } else {
        RetryDecision::Exhausted { retry_count }
    }
}

#[derive(Clone)]
pub struct RetryManager {
    repo: Arc<dyn NotificationRepository>,
}

impl RetryManager {
    pub fn new(repo: Arc<dyn NotificationRepository>) -> Self {
        Self { repo }
    }

    /// Persists the retry or the terminal failure. Returns `None` when another
    /// worker already moved the record on.
    pub async fn on_failure(&self, notification: &Notification, now: DateTime<Utc>) -> Result<Option<RetryDecision>> {
        let decision = next_retry(notification, now);

        let applied = match decision {
            RetryDecision::Retry {
                retry_count,
                next_attempt_at,
            } => {
                let applied = self
                    .repo
                    .schedule_retry(notification.id, notification.retry_count, retry_count, next_attempt_at)
                    .await?;
                if applied {
                    tracing::info!(
                        notification_id = %notification.id,
                        retry_count,
                        %next_attempt_at,
                        "Delivery failed, retry scheduled"
                    );
                }
                applied
            }
            RetryDecision::Exhausted { retry_count } => {
                let applied = self
                    .repo
                    .mark_failed(notification.id, notification.retry_count, retry_count)
                    .await?;
                if applied {
                    tracing::error!(
                        notification_id = %notification.id,
                        notification_type = %notification.notification_type,
                        retry_count,
                        "Delivery failed permanently"
                    );
                }
                applied
            }
        };

        if !applied {
            tracing::debug!(notification_id = %notification.id, "Retry transition lost a race");
        }
        Ok(applied.then_some(decision))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{InMemoryNotificationRepository, NotificationStatus, NotificationType};
    use crate::testing::{new_notification, sample_notification};

    #[test]
    fn test_backoff_doubles() {
        assert_eq!(backoff_delay(1), Duration::minutes(2));
        assert_eq!(backoff_delay(2), Duration::minutes(4));
        assert_eq!(backoff_delay(3), Duration::minutes(8));
        assert_eq!(backoff_delay(64), Duration::minutes(1 << 20));
    }

    #[test]
    fn test_next_retry_until_exhausted() {
        let now = Utc::now();
        let mut n = sample_notification();
        n.max_retries = 3;

        assert_eq!(
            next_retry(&n, now),
            RetryDecision::Retry {
                retry_count: 1,
                next_attempt_at: now + Duration::minutes(2)
            }
        );
        n.retry_count = 1;
        assert_eq!(
            next_retry(&n, now),
            RetryDecision::Retry {
                retry_count: 2,
                next_attempt_at: now + Duration::minutes(4)
            }
        );
        n.retry_count = 2;
        assert_eq!(next_retry(&n, now), RetryDecision::Exhausted { retry_count: 3 });
    }

    #[tokio::test]
    async fn test_on_failure_persists_and_guards() {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let manager = RetryManager::new(repo.clone());
        let now = Utc::now();

        let n = repo
            .create(new_notification(NotificationType::PaymentFailed), None)
            .await
            .unwrap();
        assert_eq!(n.max_retries, 5);

        let decision = manager.on_failure(&n, now).await.unwrap();
        assert!(matches!(decision, Some(RetryDecision::Retry { retry_count: 1, .. })));

        // Same stale snapshot again: retry_count no longer matches.
        assert_eq!(manager.on_failure(&n, now).await.unwrap(), None);

        let mut stored = repo.find_by_id(n.id).await.unwrap().unwrap();
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.scheduled_for, Some(now + Duration::minutes(2)));

        stored.retry_count = 4;
        repo.schedule_retry(n.id, 1, 4, now).await.unwrap();
        let decision = manager.on_failure(&stored, now).await.unwrap();
        assert_eq!(decision, Some(RetryDecision::Exhausted { retry_count: 5 }));

        let stored = repo.find_by_id(n.id).await.unwrap().unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert_eq!(stored.retry_count, 5);
    }
}
