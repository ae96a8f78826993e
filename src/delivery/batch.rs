use chrono::{Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use super::pipeline::{DeliveryPipeline, OutcomeCounts, PipelineOutcome};
use crate::error::Result;
use crate::notification::{NotificationRepository, NotificationTemplate};

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct BatchSummary {
    /// Created record ids, in recipient order.
    pub notification_ids: Vec<Uuid>,
    /// One id per chunk; empty for a single-recipient send.
    pub batch_ids: Vec<Uuid>,
    #[serde(flatten)]
    pub outcomes: OutcomeCounts,
}

/// Creates one record per recipient and runs the initial delivery pass.
///
/// Recipients are processed in chunks of `chunk_size`; each chunk shares a
/// fresh batch id and its recipients are delivered concurrently. One
/// recipient's failure never affects another.
#[derive(Clone)]
pub struct BatchCoordinator {
    repo: Arc<dyn NotificationRepository>,
    pipeline: DeliveryPipeline,
    chunk_size: usize,
    lease: Duration,
}

impl BatchCoordinator {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        pipeline: DeliveryPipeline,
        chunk_size: usize,
        lease: Duration,
    ) -> Self {
        Self {
            repo,
            pipeline,
            chunk_size: chunk_size.max(1),
            lease,
        }
    }

    /// `batched` tags every record with its chunk's batch id. Each record is
    /// leased and processed against the clock at its own creation.
    pub async fn send(&self, recipients: &[Uuid], template: &NotificationTemplate, batched: bool) -> BatchSummary {
        let mut summary = BatchSummary::default();

        for chunk in recipients.chunks(self.chunk_size) {
            let batch_id = batched.then(Uuid::new_v4);
            if let Some(id) = batch_id {
                summary.batch_ids.push(id);
            }

            let results = join_all(
                chunk
                    .iter()
                    .map(|&user_id| self.deliver_one(user_id, template, batch_id)),
            )
            .await;

            for (id, result) in results {
                summary.notification_ids.extend(id);
                summary.outcomes.record(&result);
            }

            tracing::debug!(?batch_id, recipients = chunk.len(), "Batch chunk processed");
        }

        tracing::info!(
            recipients = recipients.len(),
            created = summary.notification_ids.len(),
            delivered = summary.outcomes.delivered,
            deferred = summary.outcomes.deferred,
            retrying = summary.outcomes.retrying,
            errored = summary.outcomes.errored,
            "Notification send completed"
        );
        summary
    }

    async fn deliver_one(
        &self,
        user_id: Uuid,
        template: &NotificationTemplate,
        batch_id: Option<Uuid>,
    ) -> (Option<Uuid>, Result<PipelineOutcome>) {
        let now = Utc::now();
        // Leased on insert so the sweep leaves it alone during the initial pass.
        let created = self
            .repo
            .create(template.for_recipient(user_id, batch_id), Some(now + self.lease))
            .await;

        let notification = match created {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(%user_id, error = %e, "Failed to create notification");
                return (None, Err(e));
            }
        };

        let result = self.pipeline.process(&notification, now).await;
        if let Err(e) = &result {
            tracing::warn!(
                notification_id = %notification.id,
                error = %e,
                "Initial delivery pass failed, leaving for sweep"
            );
        }
        (Some(notification.id), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::{Channel, NotificationType};
    use crate::testing::{template, RecordingSender, TestEngine};
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_chunks_share_batch_ids() {
        let engine = TestEngine::with_chunk_size(100);
        let recipients: Vec<Uuid> = (0..250).map(|_| Uuid::new_v4()).collect();

        let summary = engine
            .coordinator
            .send(&recipients, &template(NotificationType::Promotion), true)
            .await;

        assert_eq!(summary.notification_ids.len(), 250);
        assert_eq!(summary.batch_ids.len(), 3);
        assert_eq!(summary.outcomes.delivered, 250);

        let mut per_batch: HashMap<Uuid, usize> = HashMap::new();
        for (i, id) in summary.notification_ids.iter().enumerate() {
            let n = engine.repo.find_by_id(*id).await.unwrap().unwrap();
            assert_eq!(n.user_id, recipients[i]);
            *per_batch.entry(n.batch_id.unwrap()).or_default() += 1;
        }
        let sizes: Vec<usize> = summary.batch_ids.iter().map(|b| per_batch[b]).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[tokio::test]
    async fn test_single_send_has_no_batch() {
        let engine = TestEngine::new();
        let summary = engine
            .coordinator
            .send(&[Uuid::new_v4()], &template(NotificationType::OrderConfirmation), false)
            .await;

        assert!(summary.batch_ids.is_empty());
        let n = engine
            .repo
            .find_by_id(summary.notification_ids[0])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(n.batch_id, None);
        assert_eq!(n.locked_until, None);
        assert!(n.is_sent);
    }

    #[tokio::test]
    async fn test_failed_recipients_do_not_block_others() {
        let engine = TestEngine::new();
        engine.push.set_failing(true);

        let mut content = template(NotificationType::OrderShipped);
        content.channels = Some(vec![Channel::Push]);
        let recipients: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

        let summary = engine.coordinator.send(&recipients, &content, true).await;

        assert_eq!(summary.notification_ids.len(), 3);
        assert_eq!(summary.outcomes.retrying, 3);
        assert_eq!(engine.push.calls(), 3);
    }

    #[tokio::test]
    async fn test_later_chunks_stay_leased_while_a_sweep_runs() {
        // Each send outlasts the lease.
        let push = RecordingSender::slow(Channel::Push, std::time::Duration::from_millis(300));
        let engine = TestEngine::build(push, 1, Duration::milliseconds(200));

        let mut content = template(NotificationType::OrderShipped);
        content.channels = Some(vec![Channel::Push]);
        let recipients: Vec<Uuid> = (0..2).map(|_| Uuid::new_v4()).collect();

        let sweep = async {
            tokio::time::sleep(std::time::Duration::from_millis(400)).await;
            engine.sweeper.process_scheduled(Utc::now()).await
        };
        let (summary, report) = tokio::join!(engine.coordinator.send(&recipients, &content, true), sweep);

        assert_eq!(summary.outcomes.delivered, 2);
        assert_eq!(report.unwrap().unwrap().claimed, 0);
        assert_eq!(engine.push.calls(), 2);
    }
}
