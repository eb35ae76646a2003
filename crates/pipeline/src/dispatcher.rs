//! Task dispatch: hands new jobs to the worker pool through the queue.
//!
//! [`TaskDispatcher::enqueue`] returns once the message is stored and never
//! waits for execution. [`RedispatchSweeper`] re-enqueues jobs that are
//! still `new` after a grace period, which recovers submissions whose
//! enqueue failed. Duplicate messages are harmless because a worker only
//! proceeds after winning the `new -> running` claim.

use std::sync::Arc;
use std::time::Duration;

use archdiffer_core::comparison::{ArtifactPair, JobMessage};
use archdiffer_core::status::ComparisonState;
use archdiffer_core::types::DbId;
use archdiffer_db::models::comparison::{ComparisonListQuery, SortOrder, MAX_LIMIT};
use archdiffer_db::queue::{QueueError, TaskQueue};
use archdiffer_db::store::JobStore;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct TaskDispatcher {
    queue: Arc<dyn TaskQueue>,
}

impl TaskDispatcher {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self { queue }
    }

    /// Queue job `job_id` for execution.
    pub async fn enqueue(
        &self,
        job_id: DbId,
        kind: &str,
        inputs: &ArtifactPair,
    ) -> Result<(), QueueError> {
        let message = JobMessage {
            comparison_id: job_id,
            kind: kind.to_string(),
            inputs: inputs.clone(),
        };
        self.queue.push(&message).await?;
        tracing::debug!(comparison_id = job_id, kind, "Comparison dispatched");
        Ok(())
    }
}

/// Default sweep interval.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default age a `new` job must reach before it is re-enqueued.
const DEFAULT_MIN_AGE: Duration = Duration::from_secs(300);

pub struct RedispatchSweeper {
    store: Arc<dyn JobStore>,
    dispatcher: TaskDispatcher,
    interval: Duration,
    min_age: Duration,
}

impl RedispatchSweeper {
    pub fn new(store: Arc<dyn JobStore>, dispatcher: TaskDispatcher) -> Self {
        Self {
            store,
            dispatcher,
            interval: DEFAULT_INTERVAL,
            min_age: DEFAULT_MIN_AGE,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_min_age(mut self, min_age: Duration) -> Self {
        self.min_age = min_age;
        self
    }

    /// Run sweeps until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            min_age_secs = self.min_age.as_secs(),
            "Redispatch sweeper started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Redispatch sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep_once().await {
                        Ok(0) => {}
                        Ok(count) => tracing::info!(count, "Re-enqueued stale comparisons"),
                        Err(e) => tracing::error!(error = %e, "Redispatch sweep failed"),
                    }
                }
            }
        }
    }

    /// Re-enqueue the oldest `new` jobs created more than `min_age` ago
    /// that have no message left in the queue.
    ///
    /// Returns the number of jobs re-enqueued.
    pub async fn sweep_once(&self) -> Result<usize, Box<dyn std::error::Error + Send + Sync>> {
        let min_age = chrono::Duration::from_std(self.min_age)?;
        let query = ComparisonListQuery {
            state: Some(ComparisonState::New),
            created_before: Some(chrono::Utc::now() - min_age),
            order: Some(SortOrder::Asc),
            limit: Some(MAX_LIMIT),
            ..Default::default()
        };

        let stale = self.store.list(&query).await?;
        let ids: Vec<DbId> = stale.iter().map(|job| job.id).collect();
        let queued = self.dispatcher.queue.queued(&ids).await?;

        let mut count = 0;
        for job in stale.iter().filter(|job| !queued.contains(&job.id)) {
            self.dispatcher
                .enqueue(job.id, &job.kind, &job.inputs)
                .await?;
            count += 1;
        }
        Ok(count)
    }
}
