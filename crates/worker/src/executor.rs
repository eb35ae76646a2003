//! Runs one delivered comparison from claim to terminal state.
//!
//! The claim is the `new -> running` transition in the Job Store. Only the
//! delivery that wins it executes the comparison; every other delivery of the
//! same job (redelivery after a lost ack, duplicate enqueue by the sweeper,
//! a concurrent consumer) observes an illegal transition and is skipped.
//!
//! Each attempt runs in its own temporary workspace under the configured work
//! directory. The workspace is removed when the attempt ends, before the
//! outcome is persisted, whatever that outcome is.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use archdiffer_core::comparison::{
    ArtifactDescriptor, ComparisonJob, DiffReport, JobError, JobErrorKind, JobMessage,
};
use archdiffer_core::types::DbId;
use archdiffer_db::store::{JobStore, StoreError};
use archdiffer_pipeline::plugin::{ComparatorPlugin, PluginError, PluginRegistry};
use tokio::time::timeout;

use crate::config::WorkerConfig;
use crate::retry::{with_backoff, RetryPolicy};

/// Bounds and locations for one attempt.
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub fetch_timeout: Duration,
    pub compare_timeout: Duration,
    pub work_dir: PathBuf,
    pub retry: RetryPolicy,
}

impl ExecutorSettings {
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self {
            fetch_timeout: config.fetch_timeout,
            compare_timeout: config.compare_timeout,
            work_dir: config.work_dir.clone(),
            retry: RetryPolicy {
                alarm_after: config.persist_alarm_after,
                ..RetryPolicy::default()
            },
        }
    }
}

/// What happened to a delivery. Every outcome means the message can be acked.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The job was already claimed, finished, or no longer exists.
    Skipped,
    Done { differences: usize },
    Failed(JobError),
}

#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// The claim could not be attempted. The job is still `new`, so the
    /// message must stay in the queue for redelivery.
    #[error("Could not claim comparison {id}: {source}")]
    Claim { id: DbId, source: StoreError },

    /// Neither the outcome nor the internal failure recorded in its place
    /// could be persisted.
    #[error("Could not persist outcome of comparison {id}: {source}")]
    Persist { id: DbId, source: StoreError },
}

impl ExecutionError {
    /// Whether the message should be left unacked.
    pub fn should_redeliver(&self) -> bool {
        matches!(self, ExecutionError::Claim { .. })
    }
}

pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    registry: Arc<PluginRegistry>,
    settings: ExecutorSettings,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<PluginRegistry>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    /// Claim, run and persist the comparison named by `message`.
    pub async fn execute(&self, message: &JobMessage) -> Result<ExecutionOutcome, ExecutionError> {
        let id = message.comparison_id;

        let job = match self.store.mark_running(id).await {
            Ok(job) => job,
            Err(StoreError::IllegalTransition { from, .. }) => {
                tracing::info!(comparison_id = id, state = %from, "Comparison already claimed, skipping");
                return Ok(ExecutionOutcome::Skipped);
            }
            Err(StoreError::NotFound(_)) => {
                tracing::warn!(comparison_id = id, "Comparison no longer exists, skipping");
                return Ok(ExecutionOutcome::Skipped);
            }
            Err(source) => return Err(ExecutionError::Claim { id, source }),
        };

        tracing::info!(comparison_id = id, kind = %job.kind, "Comparison started");

        let (outcome, persisted) = match self.run_attempt(&job).await {
            Ok(report) => {
                let persisted = with_backoff(&self.settings.retry, "mark_done", || {
                    self.store.mark_done(id, &report)
                })
                .await;
                (ExecutionOutcome::Done { differences: report.len() }, persisted)
            }
            Err(error) => {
                let persisted = with_backoff(&self.settings.retry, "mark_failed", || {
                    self.store.mark_failed(id, &error)
                })
                .await;
                (ExecutionOutcome::Failed(error), persisted)
            }
        };

        if let Err(rejected) = persisted {
            return self.fail_rejected(id, rejected).await;
        }

        match &outcome {
            ExecutionOutcome::Done { differences } => {
                tracing::info!(comparison_id = id, differences = *differences, "Comparison done");
            }
            ExecutionOutcome::Failed(error) => tracing::warn!(
                comparison_id = id,
                error_kind = error.kind.as_str(),
                error = %error.message,
                "Comparison failed",
            ),
            ExecutionOutcome::Skipped => {}
        }
        Ok(outcome)
    }

    /// The Job Store refused the outcome for a reason retrying cannot fix.
    /// Record an internal failure in its place so the job still leaves
    /// `running`.
    async fn fail_rejected(
        &self,
        id: DbId,
        rejected: StoreError,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        tracing::error!(comparison_id = id, error = %rejected, "Job Store rejected comparison outcome");

        let error = JobError::new(
            JobErrorKind::Internal,
            format!("Could not persist comparison outcome: {rejected}"),
        );
        with_backoff(&self.settings.retry, "mark_failed", || {
            self.store.mark_failed(id, &error)
        })
        .await
        .map_err(|source| ExecutionError::Persist { id, source })?;

        tracing::warn!(comparison_id = id, "Comparison failed with an internal error");
        Ok(ExecutionOutcome::Failed(error))
    }

    /// Everything between the claim and persistence. The workspace is
    /// dropped, and thereby removed, on return.
    async fn run_attempt(&self, job: &ComparisonJob) -> Result<DiffReport, JobError> {
        let plugin = self.registry.get(&job.kind).ok_or_else(|| {
            JobError::new(
                JobErrorKind::UnsupportedKind,
                format!("No comparator registered for kind '{}'", job.kind),
            )
        })?;

        let workspace = tempfile::Builder::new()
            .prefix(&format!("archdiffer-{}-", job.id))
            .tempdir_in(&self.settings.work_dir)
            .map_err(|e| {
                JobError::new(
                    JobErrorKind::Internal,
                    format!(
                        "Cannot create workspace in {}: {e}",
                        self.settings.work_dir.display()
                    ),
                )
            })?;

        let left = self
            .fetch(&plugin, &job.inputs.left, "pkg1", workspace.path())
            .await?;
        let right = self
            .fetch(&plugin, &job.inputs.right, "pkg2", workspace.path())
            .await?;

        let output = timeout(
            self.settings.compare_timeout,
            plugin.procedure.compare(&left, &right),
        )
        .await
        .map_err(|_| {
            JobError::new(
                JobErrorKind::ComparisonProcedureFailed,
                format!(
                    "Comparison timed out after {}s",
                    self.settings.compare_timeout.as_secs_f64()
                ),
            )
        })??;

        let records = plugin.parser.parse(&output.stdout)?;
        Ok(DiffReport::new(records))
    }

    /// Resolve `descriptor` to exactly one candidate and download it into a
    /// per-side directory of the workspace.
    async fn fetch(
        &self,
        plugin: &ComparatorPlugin,
        descriptor: &ArtifactDescriptor,
        side: &str,
        workspace: &Path,
    ) -> Result<PathBuf, JobError> {
        let dir = workspace.join(side);
        let work = resolve_and_download(plugin, descriptor, side, &dir);

        match timeout(self.settings.fetch_timeout, work).await {
            Ok(Ok(path)) => Ok(path),
            Ok(Err(e)) => {
                let mut error = JobError::from(e);
                error.message = format!("{side}: {}", error.message);
                Err(error)
            }
            Err(_) => Err(JobError::new(
                JobErrorKind::ArtifactFetchFailed,
                format!(
                    "{side}: fetch timed out after {}s",
                    self.settings.fetch_timeout.as_secs_f64()
                ),
            )),
        }
    }
}

/// Pick the single candidate passing every filter of `descriptor` and
/// download it into `dir`.
async fn resolve_and_download(
    plugin: &ComparatorPlugin,
    descriptor: &ArtifactDescriptor,
    side: &str,
    dir: &Path,
) -> Result<PathBuf, PluginError> {
    tokio::fs::create_dir(dir)
        .await
        .map_err(|e| PluginError::Fetch(format!("cannot create {}: {e}", dir.display())))?;

    let candidates: Vec<_> = plugin
        .source
        .resolve(descriptor)
        .await?
        .into_iter()
        .filter(|c| descriptor.matches(c))
        .collect();

    let candidate = match <[_; 1]>::try_from(candidates) {
        Ok([candidate]) => candidate,
        Err(found) => {
            return Err(PluginError::AmbiguousArtifact {
                name: descriptor.name.clone(),
                found: found.len(),
            })
        }
    };
    tracing::debug!(side, nevra = %candidate.nevra(), "Artifact resolved");

    plugin.source.materialize(&candidate, descriptor, dir).await
}
