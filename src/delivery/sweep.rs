use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use utoipa::ToSchema;

use super::pipeline::{DeliveryPipeline, OutcomeCounts};
use crate::error::Result;
use crate::notification::NotificationRepository;

#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct SweepReport {
    pub claimed: usize,
    #[serde(flatten)]
    pub outcomes: OutcomeCounts,
}

#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub limit: i64,
    pub concurrency: usize,
    pub lease: Duration,
}

/// Periodic pass over due pending records.
///
/// At most one sweep runs per process; a trigger that arrives while one is
/// in flight is dropped. Across processes the claim lease keeps a record
/// with a single owner.
#[derive(Clone)]
pub struct Sweeper {
    repo: Arc<dyn NotificationRepository>,
    pipeline: DeliveryPipeline,
    config: SweepConfig,
    running: Arc<Mutex<()>>,
}

impl Sweeper {
    pub fn new(repo: Arc<dyn NotificationRepository>, pipeline: DeliveryPipeline, config: SweepConfig) -> Self {
        Self {
            repo,
            pipeline,
            config,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Returns `None` when another sweep is still running.
    pub async fn process_scheduled(&self, now: DateTime<Utc>) -> Result<Option<SweepReport>> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::debug!("Sweep already in progress, skipping");
            return Ok(None);
        };

        let claimed = self
            .repo
            .claim_due(now, now + self.config.lease, self.config.limit)
            .await?;

        let mut report = SweepReport {
            claimed: claimed.len(),
            ..Default::default()
        };
        if claimed.is_empty() {
            return Ok(Some(report));
        }

        let pipeline = &self.pipeline;
        let results: Vec<_> = stream::iter(claimed)
            .map(|notification| async move {
                let result = pipeline.process(&notification, now).await;
                if let Err(e) = &result {
                    tracing::warn!(notification_id = %notification.id, error = %e, "Sweep delivery failed");
                }
                result
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for result in &results {
            report.outcomes.record(result);
        }

        tracing::info!(
            claimed = report.claimed,
            delivered = report.outcomes.delivered,
            deferred = report.outcomes.deferred,
            retrying = report.outcomes.retrying,
            failed = report.outcomes.failed,
            expired = report.outcomes.expired,
            "Processed scheduled notifications"
        );
        Ok(Some(report))
    }

    pub async fn cleanup_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let deleted = self.repo.delete_expired(now).await?;
        if deleted > 0 {
            tracing::info!(deleted, "Deleted expired notifications");
        }
        Ok(deleted)
    }
}

/// Registers the sweep and cleanup cron jobs and starts the scheduler.
pub async fn start_sweep_service(
    sweeper: Sweeper,
    sweep_cron: &str,
    cleanup_cron: &str,
) -> std::result::Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    let sweep = sweeper.clone();
    let sweep_job = Job::new_async(sweep_cron, move |_uuid, _l| {
        let sweeper = sweep.clone();
        Box::pin(async move {
            if let Err(e) = sweeper.process_scheduled(Utc::now()).await {
                tracing::error!("Failed to process scheduled notifications: {:?}", e);
            }
        })
    })?;
    scheduler.add(sweep_job).await?;

    let cleanup_job = Job::new_async(cleanup_cron, move |_uuid, _l| {
        let sweeper = sweeper.clone();
        Box::pin(async move {
            if let Err(e) = sweeper.cleanup_expired(Utc::now()).await {
                tracing::error!("Failed to clean up expired notifications: {:?}", e);
            }
        })
    })?;
    scheduler.add(cleanup_job).await?;

    scheduler.start().await?;
    tracing::info!(sweep_cron, cleanup_cron, "Notification sweep service started");

    Ok(scheduler)
}
