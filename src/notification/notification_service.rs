use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::delivery::{BatchCoordinator, BatchSummary, SweepReport, Sweeper};
use crate::error::{AppError, Result};
use super::{
    notification_dto::{
        BulkNotificationRequest, NotificationListResponse, NotificationQuery, NotificationTemplate,
        SendNotificationRequest,
    },
    notification_models::{Notification, NotificationType},
    notification_repository::{DeliveryAttempt, NotificationFilters, NotificationRepository},
};

/// Upper bound on recipients in one request.
const MAX_RECIPIENTS: usize = 10_000;

const DEFAULT_PAGE_LIMIT: u32 = 20;
const MAX_PAGE_LIMIT: u32 = 100;

/// Inbound API of the engine. Validation happens here, before any record
/// exists; delivery itself is owned by the batch coordinator and the sweeper.
#[derive(Clone)]
pub struct NotificationService {
    repo: Arc<dyn NotificationRepository>,
    coordinator: BatchCoordinator,
    sweeper: Sweeper,
}

impl NotificationService {
    pub fn new(repo: Arc<dyn NotificationRepository>, coordinator: BatchCoordinator, sweeper: Sweeper) -> Self {
        Self {
            repo,
            coordinator,
            sweeper,
        }
    }

    /// Persists one record per recipient and attempts the first delivery.
    /// Succeeds once the records exist, whatever the delivery outcome.
    pub async fn send_notification(&self, payload: SendNotificationRequest, now: DateTime<Utc>) -> Result<BatchSummary> {
        payload.validate()?;
        let (recipients, template) = payload.into_parts();
        let recipients = unique_recipients(recipients)?;
        validate_template(&template, now)?;

        let batched = recipients.len() > 1;
        Ok(self.coordinator.send(&recipients, &template, batched).await)
    }

    pub async fn send_bulk_notification(
        &self,
        payload: BulkNotificationRequest,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary> {
        payload.template.validate()?;
        let recipients = unique_recipients(payload.recipient_ids)?;
        validate_template(&payload.template, now)?;

        Ok(self
            .coordinator
            .send(&recipients, &payload.template, true)
            .await)
    }

    pub async fn get_user_notifications(
        &self,
        user_id: Uuid,
        query: NotificationQuery,
        now: DateTime<Utc>,
    ) -> Result<NotificationListResponse> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);

        let filters = NotificationFilters {
            unread_only: query.unread_only.unwrap_or(false),
            types: parse_types(query.types.as_deref())?,
            page,
            limit,
        };

        let result = self.repo.find_for_user(user_id, &filters, now).await?;
        let total_pages = (result.total as f64 / limit as f64).ceil() as u32;

        Ok(NotificationListResponse {
            data: result.items,
            total: result.total,
            unread_count: result.unread_count,
            page,
            limit,
            total_pages,
        })
    }

    pub async fn mark_as_read(&self, id: Uuid, user_id: Uuid, now: DateTime<Utc>) -> Result<Notification> {
        self.repo
            .mark_as_read(id, user_id, now)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))
    }

    pub async fn mark_all_as_read(&self, user_id: Uuid, now: DateTime<Utc>) -> Result<u64> {
        let updated = self.repo.mark_all_as_read(user_id, now).await?;
        tracing::debug!(%user_id, updated, "Marked all notifications as read");
        Ok(updated)
    }

    pub async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<()> {
        if self.repo.delete(id, user_id).await? == 0 {
            return Err(AppError::NotFound("Notification not found".to_string()));
        }
        Ok(())
    }

    /// Per-channel attempt history of one of the user's notifications.
    pub async fn get_deliveries(&self, id: Uuid, user_id: Uuid) -> Result<Vec<DeliveryAttempt>> {
        match self.repo.find_by_id(id).await? {
            Some(n) if n.user_id == user_id => self.repo.find_deliveries(id).await,
            _ => Err(AppError::NotFound("Notification not found".to_string())),
        }
    }

    /// `None` when a sweep is already running.
    pub async fn process_scheduled_notifications(&self, now: DateTime<Utc>) -> Result<Option<SweepReport>> {
        self.sweeper.process_scheduled(now).await
    }

    pub async fn cleanup_expired_notifications(&self, now: DateTime<Utc>) -> Result<u64> {
        self.sweeper.cleanup_expired(now).await
    }
}

/// Drops duplicate ids, keeping first-occurrence order.
fn unique_recipients(recipients: Vec<Uuid>) -> Result<Vec<Uuid>> {
    let mut seen = HashSet::with_capacity(recipients.len());
    let unique: Vec<Uuid> = recipients.into_iter().filter(|id| seen.insert(*id)).collect();

    if unique.is_empty() {
        return Err(AppError::Validation("At least one recipient is required".to_string()));
    }
    if unique.len() > MAX_RECIPIENTS {
        return Err(AppError::Validation(format!(
            "At most {} recipients per request",
            MAX_RECIPIENTS
        )));
    }
    Ok(unique)
}

fn validate_template(template: &NotificationTemplate, now: DateTime<Utc>) -> Result<()> {
    if template.channels.as_ref().is_some_and(|c| c.is_empty()) {
        return Err(AppError::Validation("channels must not be empty".to_string()));
    }
    if template.scheduled_for.is_some_and(|at| at <= now) {
        return Err(AppError::Validation("scheduled_for must be in the future".to_string()));
    }
    if template.expires_at.is_some_and(|at| at <= now) {
        return Err(AppError::Validation("expires_at must be in the future".to_string()));
    }
    if let (Some(scheduled), Some(expires)) = (template.scheduled_for, template.expires_at) {
        if expires <= scheduled {
            return Err(AppError::Validation(
                "expires_at must be after scheduled_for".to_string(),
            ));
        }
    }
    Ok(())
}

fn parse_types(types: Option<&str>) -> Result<Vec<NotificationType>> {
    types
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<NotificationType>().map_err(AppError::Validation))
        .collect()
}
