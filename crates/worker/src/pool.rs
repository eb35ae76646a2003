//! A fixed number of worker slots draining the task queue.
//!
//! Each slot loops independently: lease a message, execute it, ack it. A
//! message is left unacked only when the claim could not be attempted, so it
//! reappears once its lease expires. On cancellation, slots finish the job
//! they are running and then stop.

use std::sync::Arc;
use std::time::Duration;

use archdiffer_db::queue::{Delivery, TaskQueue};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::executor::JobExecutor;

pub struct WorkerPool {
    queue: Arc<dyn TaskQueue>,
    executor: Arc<JobExecutor>,
    concurrency: usize,
    poll_interval: Duration,
    lease: Duration,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn TaskQueue>, executor: Arc<JobExecutor>, concurrency: usize) -> Self {
        Self {
            queue,
            executor,
            concurrency: concurrency.max(1),
            poll_interval: Duration::from_secs(1),
            lease: Duration::from_secs(1560),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Run all slots until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            concurrency = self.concurrency,
            lease_secs = self.lease.as_secs(),
            "Worker pool started",
        );

        let mut slots = JoinSet::new();
        for slot in 0..self.concurrency {
            let worker = Slot {
                id: slot,
                queue: Arc::clone(&self.queue),
                executor: Arc::clone(&self.executor),
                poll_interval: self.poll_interval,
                lease: self.lease,
            };
            slots.spawn(worker.run(cancel.clone()));
        }

        while let Some(joined) = slots.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Worker slot panicked");
            }
        }

        tracing::info!("Worker pool stopped");
    }
}

struct Slot {
    id: usize,
    queue: Arc<dyn TaskQueue>,
    executor: Arc<JobExecutor>,
    poll_interval: Duration,
    lease: Duration,
}

impl Slot {
    async fn run(self, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let idle = match self.queue.pop(self.lease).await {
                Ok(Some(delivery)) => {
                    self.process(delivery).await;
                    false
                }
                Ok(None) => true,
                Err(e) => {
                    tracing::error!(slot = self.id, error = %e, "Queue pop failed");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }
        }
        tracing::debug!(slot = self.id, "Worker slot stopped");
    }

    async fn process(&self, delivery: Delivery) {
        let comparison_id = delivery.message.comparison_id;
        tracing::debug!(
            slot = self.id,
            comparison_id,
            attempt = delivery.attempt,
            "Delivery received",
        );

        if let Err(e) = self.executor.execute(&delivery.message).await {
            if e.should_redeliver() {
                tracing::warn!(slot = self.id, comparison_id, error = %e, "Leaving message for redelivery");
                return;
            }
            tracing::error!(slot = self.id, comparison_id, error = %e, "Comparison outcome lost");
        }

        if let Err(e) = self.queue.ack(delivery.delivery_id).await {
            // The lease will expire and the redelivery will be skipped.
            tracing::warn!(slot = self.id, comparison_id, error = %e, "Ack failed");
        }
    }
}
