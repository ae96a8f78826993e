use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sqlx::{FromRow, PgPool, QueryBuilder};
use utoipa::ToSchema;
use uuid::Uuid;

use super::notification_models::{
    Channel, ChannelOutcome, NewNotification, Notification, NotificationStatus, NotificationType,
};

/// Column list for `notifications` queries.
const NOTIFICATION_COLUMNS: &str = "id, user_id, notification_type, title, body, payload, \
    channels, priority, status, is_read, read_at, is_sent, sent_at, expires_at, scheduled_for, \
    retry_count, max_retries, batch_id, template_id, locked_until, created_at, updated_at";

#[derive(Debug, Clone, Default)]
pub struct NotificationFilters {
    pub unread_only: bool,
    pub types: Vec<NotificationType>,
    pub page: u32,
    pub limit: u32,
}

impl NotificationFilters {
    fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.limit as i64
    }
}

#[derive(Debug, Clone)]
pub struct NotificationPage {
    pub items: Vec<Notification>,
    pub total: i64,
    pub unread_count: i64,
}

/// Per-channel record of one dispatch attempt.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct DeliveryAttempt {
    pub notification_id: Uuid,
    pub channel: Channel,
    pub success: bool,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

/// Lifecycle store for notification records.
///
/// Every delivery transition is a guarded single-record update: it applies
/// only while the record is still pending and unsent (and, for retry
/// transitions, only if `retry_count` still holds the value the caller read).
/// A transition that lost a race returns `false`.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn create(&self, new: NewNotification, locked_until: Option<DateTime<Utc>>) -> Result<Notification>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>>;

    /// Non-expired notifications for a user, newest first.
    async fn find_for_user(
        &self,
        user_id: Uuid,
        filters: &NotificationFilters,
        now: DateTime<Utc>,
    ) -> Result<NotificationPage>;

    async fn mark_as_read(&self, id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<Notification>>;

    async fn mark_all_as_read(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64>;

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<u64>;

    /// Leases up to `limit` due records until `lease_until` and returns them.
    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>>;

    async fn mark_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> Result<bool>;

    async fn defer(&self, id: Uuid, until: DateTime<Utc>) -> Result<bool>;

    async fn schedule_retry(
        &self,
        id: Uuid,
        expected_retry_count: i32,
        retry_count: i32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn mark_failed(&self, id: Uuid, expected_retry_count: i32, retry_count: i32) -> Result<bool>;

    async fn mark_expired(&self, id: Uuid) -> Result<bool>;

    async fn record_outcomes(
        &self,
        id: Uuid,
        outcomes: &[ChannelOutcome],
        attempted_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn find_deliveries(&self, id: Uuid) -> Result<Vec<DeliveryAttempt>>;

    /// Purges records whose expiry has passed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Clone)]
pub struct PgNotificationRepository {
    pool: PgPool,
}

impl PgNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for PgNotificationRepository {
    async fn create(&self, new: NewNotification, locked_until: Option<DateTime<Utc>>) -> Result<Notification> {
        let query = format!(
            "INSERT INTO notifications (id, user_id, notification_type, title, body, payload, channels, \
                priority, status, expires_at, scheduled_for, max_retries, batch_id, template_id, locked_until) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'PENDING', $9, $10, $11, $12, $13, $14) \
             RETURNING {NOTIFICATION_COLUMNS}"
        );
        let notification = sqlx::query_as::<_, Notification>(&query)
            .bind(Uuid::new_v4())
            .bind(new.user_id)
            .bind(new.notification_type)
            .bind(&new.title)
            .bind(&new.body)
            .bind(new.payload.map(sqlx::types::Json))
            .bind(sqlx::types::Json(&new.channels))
            .bind(new.priority)
            .bind(new.expires_at)
            .bind(new.scheduled_for)
            .bind(new.notification_type.max_retries())
            .bind(new.batch_id)
            .bind(&new.template_id)
            .bind(locked_until)
            .fetch_one(&self.pool)
            .await?;

        Ok(notification)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        let query = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1");
        let notification = sqlx::query_as::<_, Notification>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(notification)
    }

    async fn find_for_user(
        &self,
        user_id: Uuid,
        filters: &NotificationFilters,
        now: DateTime<Utc>,
    ) -> Result<NotificationPage> {
        let visible = "user_id = $1 AND status <> 'EXPIRED' \
             AND (expires_at IS NULL OR expires_at > $2)";
        let filtered = format!(
            "{visible} AND ($3 = false OR is_read = false) \
             AND (cardinality($4::text[]) = 0 OR notification_type = ANY($4))"
        );
        let types: Vec<String> = filters.types.iter().map(|t| t.to_string()).collect();

        let query = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE {filtered} \
             ORDER BY created_at DESC LIMIT $5 OFFSET $6"
        );
        let items = sqlx::query_as::<_, Notification>(&query)
            .bind(user_id)
            .bind(now)
            .bind(filters.unread_only)
            .bind(&types)
            .bind(filters.limit as i64)
            .bind(filters.offset())
            .fetch_all(&self.pool)
            .await?;

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM notifications WHERE {filtered}"))
            .bind(user_id)
            .bind(now)
            .bind(filters.unread_only)
            .bind(&types)
            .fetch_one(&self.pool)
            .await?;

        let unread_count: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM notifications WHERE {visible} AND is_read = false"
        ))
        .bind(user_id)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(NotificationPage {
            items,
            total,
            unread_count,
        })
    }

    async fn mark_as_read(&self, id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<Notification>> {
        let query = format!(
            "UPDATE notifications SET is_read = true, read_at = COALESCE(read_at, $3), updated_at = NOW() \
             WHERE id = $1 AND user_id = $2 \
             RETURNING {NOTIFICATION_COLUMNS}"
        );
        let notification = sqlx::query_as::<_, Notification>(&query)
            .bind(id)
            .bind(user_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        Ok(notification)
    }

    async fn mark_all_as_read(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = true, read_at = $2, updated_at = NOW() \
             WHERE user_id = $1 AND is_read = false",
        )
        .bind(user_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let query = format!(
            "UPDATE notifications SET locked_until = $2, updated_at = NOW() \
             WHERE id IN ( \
                SELECT id FROM notifications \
                WHERE status = 'PENDING' AND is_sent = false \
                  AND (scheduled_for IS NULL OR scheduled_for <= $1) \
                  AND (expires_at IS NULL OR expires_at > $1) \
                  AND (locked_until IS NULL OR locked_until <= $1) \
                ORDER BY scheduled_for NULLS FIRST, created_at \
                LIMIT $3 \
                FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING {NOTIFICATION_COLUMNS}"
        );
        let notifications = sqlx::query_as::<_, Notification>(&query)
            .bind(now)
            .bind(lease_until)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(notifications)
    }

    async fn mark_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET status = 'SENT', is_sent = true, sent_at = $2, \
                locked_until = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'PENDING' AND is_sent = false",
        )
        .bind(id)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn defer(&self, id: Uuid, until: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET scheduled_for = GREATEST(COALESCE(scheduled_for, $2), $2), \
                locked_until = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'PENDING' AND is_sent = false",
        )
        .bind(id)
        .bind(until)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        expected_retry_count: i32,
        retry_count: i32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET retry_count = $3, scheduled_for = $4, \
                locked_until = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'PENDING' AND is_sent = false AND retry_count = $2",
        )
        .bind(id)
        .bind(expected_retry_count)
        .bind(retry_count)
        .bind(next_attempt_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_failed(&self, id: Uuid, expected_retry_count: i32, retry_count: i32) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET status = 'FAILED', retry_count = $3, \
                locked_until = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'PENDING' AND is_sent = false AND retry_count = $2",
        )
        .bind(id)
        .bind(expected_retry_count)
        .bind(retry_count)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_expired(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET status = 'EXPIRED', locked_until = NULL, updated_at = NOW() \
             WHERE id = $1 AND status = 'PENDING' AND is_sent = false",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_outcomes(
        &self,
        id: Uuid,
        outcomes: &[ChannelOutcome],
        attempted_at: DateTime<Utc>,
    ) -> Result<()> {
        if outcomes.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::new(
            "INSERT INTO notification_deliveries (notification_id, channel, success, error, attempted_at) ",
        );
        builder.push_values(outcomes, |mut row, outcome| {
            row.push_bind(id)
                .push_bind(outcome.channel)
                .push_bind(outcome.success)
                .push_bind(outcome.error.clone())
                .push_bind(attempted_at);
        });
        builder.build().execute(&self.pool).await?;

        Ok(())
    }

    async fn find_deliveries(&self, id: Uuid) -> Result<Vec<DeliveryAttempt>> {
        let attempts = sqlx::query_as::<_, DeliveryAttempt>(
            "SELECT notification_id, channel, success, error, attempted_at \
             FROM notification_deliveries WHERE notification_id = $1 \
             ORDER BY attempted_at, id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(attempts)
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM notifications WHERE expires_at IS NOT NULL AND expires_at < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// DashMap-backed store for local runs without Postgres. Each transition
/// holds the record's shard lock for the whole check-and-set.
#[derive(Clone, Default)]
pub struct InMemoryNotificationRepository {
    notifications: std::sync::Arc<DashMap<Uuid, Notification>>,
    deliveries: std::sync::Arc<DashMap<Uuid, Vec<DeliveryAttempt>>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition<F>(&self, id: Uuid, apply: F) -> bool
    where
        F: FnOnce(&mut Notification) -> bool,
    {
        match self.notifications.get_mut(&id) {
            Some(mut entry) if entry.is_pending() => {
                let applied = apply(&mut entry);
                if applied {
                    entry.locked_until = None;
                    entry.updated_at = Utc::now();
                }
                applied
            }
            _ => false,
        }
    }
}

fn is_visible(n: &Notification, user_id: Uuid, now: DateTime<Utc>) -> bool {
    n.user_id == user_id
        && n.status != NotificationStatus::Expired
        && n.expires_at.map_or(true, |at| at > now)
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn create(&self, new: NewNotification, locked_until: Option<DateTime<Utc>>) -> Result<Notification> {
        let mut notification = new.into_notification(Uuid::new_v4(), Utc::now());
        notification.locked_until = locked_until;
        self.notifications
            .insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Notification>> {
        Ok(self.notifications.get(&id).map(|n| n.clone()))
    }

    async fn find_for_user(
        &self,
        user_id: Uuid,
        filters: &NotificationFilters,
        now: DateTime<Utc>,
    ) -> Result<NotificationPage> {
        let mut unread_count = 0;
        let mut matching: Vec<Notification> = Vec::new();

        for entry in self.notifications.iter() {
            let n = entry.value();
            if !is_visible(n, user_id, now) {
                continue;
            }
            if !n.is_read {
                unread_count += 1;
            }
            if filters.unread_only && n.is_read {
                continue;
            }
            if !filters.types.is_empty() && !filters.types.contains(&n.notification_type) {
                continue;
            }
            matching.push(n.clone());
        }

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit as usize)
            .collect();

        Ok(NotificationPage {
            items,
            total,
            unread_count,
        })
    }

    async fn mark_as_read(&self, id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Result<Option<Notification>> {
        match self.notifications.get_mut(&id) {
            Some(mut entry) if entry.user_id == user_id => {
                entry.is_read = true;
                entry.read_at.get_or_insert(now);
                entry.updated_at = Utc::now();
                Ok(Some(entry.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn mark_all_as_read(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let mut updated = 0;
        for mut entry in self.notifications.iter_mut() {
            if entry.user_id == user_id && !entry.is_read {
                entry.is_read = true;
                entry.read_at = Some(now);
                entry.updated_at = Utc::now();
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> Result<u64> {
        let removed = self
            .notifications
            .remove_if(&id, |_, n| n.user_id == user_id)
            .is_some();
        if removed {
            self.deliveries.remove(&id);
        }
        Ok(removed as u64)
    }

    async fn claim_due(
        &self,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Notification>> {
        let is_due = |n: &Notification| {
            n.is_pending()
                && n.scheduled_for.map_or(true, |at| at <= now)
                && n.expires_at.map_or(true, |at| at > now)
                && n.locked_until.map_or(true, |at| at <= now)
        };

        let mut candidates: Vec<(Option<DateTime<Utc>>, DateTime<Utc>, Uuid)> = self
            .notifications
            .iter()
            .filter(|entry| is_due(entry.value()))
            .map(|entry| (entry.scheduled_for, entry.created_at, entry.id))
            .collect();
        candidates.sort();

        let mut claimed = Vec::new();
        for (_, _, id) in candidates {
            if claimed.len() as i64 >= limit {
                break;
            }
            if let Some(mut entry) = self.notifications.get_mut(&id) {
                // Re-check under the entry lock; a concurrent claim may have won.
                if is_due(entry.value()) {
                    entry.locked_until = Some(lease_until);
                    entry.updated_at = Utc::now();
                    claimed.push(entry.clone());
                }
            }
        }

        Ok(claimed)
    }

    async fn mark_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> Result<bool> {
        Ok(self.transition(id, |n| {
            n.status = NotificationStatus::Sent;
            n.is_sent = true;
            n.sent_at = Some(sent_at);
            true
        }))
    }

    async fn defer(&self, id: Uuid, until: DateTime<Utc>) -> Result<bool> {
        Ok(self.transition(id, |n| {
            n.scheduled_for = Some(n.scheduled_for.map_or(until, |at| at.max(until)));
            true
        }))
    }

    async fn schedule_retry(
        &self,
        id: Uuid,
        expected_retry_count: i32,
        retry_count: i32,
        next_attempt_at: DateTime<Utc>,
    ) -> Result<bool> {
        Ok(self.transition(id, |n| {
            if n.retry_count != expected_retry_count {
                return false;
            }
            n.retry_count = retry_count;
            n.scheduled_for = Some(next_attempt_at);
            true
        }))
    }

    async fn mark_failed(&self, id: Uuid, expected_retry_count: i32, retry_count: i32) -> Result<bool> {
        Ok(self.transition(id, |n| {
            if n.retry_count != expected_retry_count {
                return false;
            }
            n.retry_count = retry_count;
            n.status = NotificationStatus::Failed;
            true
        }))
    }

    async fn mark_expired(&self, id: Uuid) -> Result<bool> {
        Ok(self.transition(id, |n| {
            n.status = NotificationStatus::Expired;
            true
        }))
    }

    async fn record_outcomes(
        &self,
        id: Uuid,
        outcomes: &[ChannelOutcome],
        attempted_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut attempts = self.deliveries.entry(id).or_default();
        attempts.extend(outcomes.iter().map(|o| DeliveryAttempt {
            notification_id: id,
            channel: o.channel,
            success: o.success,
            error: o.error.clone(),
            attempted_at,
        }));
        Ok(())
    }

    async fn find_deliveries(&self, id: Uuid) -> Result<Vec<DeliveryAttempt>> {
        Ok(self
            .deliveries
            .get(&id)
            .map(|attempts| attempts.clone())
            .unwrap_or_default())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let expired: Vec<Uuid> = self
            .notifications
            .iter()
            .filter(|entry| entry.expires_at.is_some_and(|at| at < now))
            .map(|entry| entry.id)
            .collect();

        let mut deleted = 0;
        for id in expired {
            if self
                .notifications
                .remove_if(&id, |_, n| n.expires_at.is_some_and(|at| at < now))
                .is_some()
            {
                self.deliveries.remove(&id);
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
