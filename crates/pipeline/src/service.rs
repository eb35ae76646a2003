//! Submission and polling façade used by the REST layer.
//!
//! Submitting persists the job first and only then enqueues it. An enqueue
//! failure does not fail the submission: the job stays `new`, is reported
//! with `dispatched = false`, and is picked up later by the
//! [`RedispatchSweeper`](crate::dispatcher::RedispatchSweeper).

use std::sync::Arc;

use archdiffer_core::comparison::{
    ArtifactPair, ComparisonJob, ComparisonSummary, ComparisonType, Difference,
};
use archdiffer_core::error::CoreError;
use archdiffer_core::grouping::{GroupedRecord, RowGrouping};
use archdiffer_core::types::DbId;
use archdiffer_db::models::comparison::ComparisonListQuery;
use archdiffer_db::models::comparison_type::ComparisonTypeTable;
use archdiffer_db::store::{DifferenceRow, JobStore, StoreError, TypeRow};

use crate::dispatcher::TaskDispatcher;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of [`ComparisonService::submit`].
#[derive(Debug, Clone)]
pub struct Submission {
    pub job: ComparisonJob,
    /// Whether the job reached the queue. `false` means it waits for the
    /// redispatch sweep.
    pub dispatched: bool,
}

pub type ComparisonListing = Vec<GroupedRecord<ComparisonSummary, ()>>;
pub type DifferenceListing = Vec<GroupedRecord<ComparisonSummary, Difference>>;
pub type TypeListing = Vec<GroupedRecord<ComparisonType, ComparisonSummary>>;

pub struct ComparisonService {
    store: Arc<dyn JobStore>,
    dispatcher: TaskDispatcher,
    types: Arc<ComparisonTypeTable>,
}

impl ComparisonService {
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: TaskDispatcher,
        types: Arc<ComparisonTypeTable>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            types,
        }
    }

    /// Validate, persist and enqueue a comparison. Returns immediately.
    pub async fn submit(&self, kind: &str, inputs: ArtifactPair) -> Result<Submission, ServiceError> {
        inputs.validate_inputs()?;

        let job = self.store.create(kind, &inputs).await?;
        tracing::info!(comparison_id = job.id, kind, "Comparison submitted");

        let dispatched = match self.dispatcher.enqueue(job.id, &job.kind, &job.inputs).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    comparison_id = job.id,
                    error = %e,
                    "Enqueue failed; comparison left for redispatch",
                );
                false
            }
        };

        Ok(Submission { job, dispatched })
    }

    /// Current snapshot of a job.
    pub async fn status(&self, id: DbId) -> Result<ComparisonJob, ServiceError> {
        self.store.get(id).await?.ok_or_else(|| {
            CoreError::NotFound {
                entity: "Comparison",
                id,
            }
            .into()
        })
    }

    pub async fn list(&self, query: &ComparisonListQuery) -> Result<ComparisonListing, ServiceError> {
        let jobs = self.store.list(query).await?;
        Ok(RowGrouping::new(|job: &ComparisonJob| job.id, ComparisonJob::summary)
            .group(jobs)
            .collect())
    }

    /// Comparisons with their differences nested under `differences`.
    pub async fn list_with_differences(
        &self,
        query: &ComparisonListQuery,
    ) -> Result<DifferenceListing, ServiceError> {
        let rows = self.store.difference_rows(query).await?;
        Ok(
            RowGrouping::new(|r: &DifferenceRow| r.comparison.id, |r| r.comparison.clone())
                .with_children("differences", |r| r.difference.clone())
                .group(rows)
                .collect(),
        )
    }

    /// Comparison types with their comparisons nested under `comparisons`.
    pub async fn list_types(&self) -> Result<TypeListing, ServiceError> {
        let rows = self.store.type_rows().await?;
        Ok(
            RowGrouping::new(|r: &TypeRow| r.comparison_type.id, |r| r.comparison_type.clone())
                .with_children("comparisons", |r| r.comparison.clone())
                .group(rows)
                .collect(),
        )
    }

    /// Comparison types known at startup.
    pub fn kinds(&self) -> Vec<ComparisonType> {
        self.types.types()
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        self.store.ping().await?;
        Ok(())
    }
}
