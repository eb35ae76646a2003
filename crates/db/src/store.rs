//! The Job Store: durable record of comparison jobs.
//!
//! Every transition is a compare-and-swap on the expected predecessor state,
//! so of any number of concurrent `mark_running` calls for one id exactly
//! one succeeds. The rest see [`StoreError::IllegalTransition`].

use std::sync::Arc;

use archdiffer_core::comparison::{
    ArtifactPair, ComparisonJob, ComparisonSummary, ComparisonType, Difference, DiffReport,
    JobError,
};
use archdiffer_core::status::ComparisonState;
use archdiffer_core::types::DbId;
use async_trait::async_trait;

use crate::models::comparison::ComparisonListQuery;
use crate::models::comparison_type::ComparisonTypeTable;
use crate::repositories::ComparisonRepo;
use crate::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Comparison {0} not found")]
    NotFound(DbId),

    #[error("Comparison {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: DbId,
        from: ComparisonState,
        to: ComparisonState,
    },

    #[error("Unknown comparison type '{0}'")]
    UnknownKind(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Whether the failure is transient and the same call may succeed later.
    pub fn is_unavailable(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(sqlx::Error::Database(db)) => {
                db.code().is_some_and(|code| is_transient_sqlstate(&code))
            }
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Tls(_)
                    | sqlx::Error::Protocol(_)
            ),
            _ => false,
        }
    }
}

/// SQLSTATEs a retry of the same statement can get past. Covers connection
/// exceptions, insufficient resources, server shutdown, serialization
/// failures and deadlocks.
pub fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08")
        || code.starts_with("53")
        || matches!(code, "57P01" | "57P02" | "57P03" | "40001" | "40P01")
}

/// One flat row of the comparisons/differences outer join.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferenceRow {
    pub comparison: ComparisonSummary,
    pub difference: Option<Difference>,
}

/// One flat row of the types/comparisons outer join.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRow {
    pub comparison_type: ComparisonType,
    pub comparison: Option<ComparisonSummary>,
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a new job in state `new`.
    async fn create(&self, kind: &str, inputs: &ArtifactPair) -> Result<ComparisonJob, StoreError>;

    async fn get(&self, id: DbId) -> Result<Option<ComparisonJob>, StoreError>;

    async fn list(&self, query: &ComparisonListQuery) -> Result<Vec<ComparisonJob>, StoreError>;

    /// Join rows ordered by comparison (in the query's order), then by
    /// difference id. Pagination counts comparisons, not rows.
    async fn difference_rows(
        &self,
        query: &ComparisonListQuery,
    ) -> Result<Vec<DifferenceRow>, StoreError>;

    /// Join rows ordered by type id, then comparison id.
    async fn type_rows(&self) -> Result<Vec<TypeRow>, StoreError>;

    /// `new -> running`.
    async fn mark_running(&self, id: DbId) -> Result<ComparisonJob, StoreError>;

    /// `running -> done`, recording the report and its difference rows.
    async fn mark_done(&self, id: DbId, report: &DiffReport) -> Result<(), StoreError>;

    /// `running -> failed`, recording the error.
    async fn mark_failed(&self, id: DbId, error: &JobError) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Postgres-backed [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
    pool: DbPool,
    types: Arc<ComparisonTypeTable>,
}

impl PgJobStore {
    pub fn new(pool: DbPool, types: Arc<ComparisonTypeTable>) -> Self {
        Self { pool, types }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    /// Explain why a guarded update matched no row.
    async fn rejected(&self, id: DbId, to: ComparisonState) -> StoreError {
        match ComparisonRepo::state_of(&self.pool, id).await {
            Ok(None) => StoreError::NotFound(id),
            Ok(Some(state_id)) => match ComparisonState::from_id(state_id) {
                Some(from) => StoreError::IllegalTransition { id, from, to },
                None => StoreError::Database(sqlx::Error::Decode(
                    format!("unknown comparison state id {state_id}").into(),
                )),
            },
            Err(e) => StoreError::Database(e),
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, kind: &str, inputs: &ArtifactPair) -> Result<ComparisonJob, StoreError> {
        let type_id = self
            .types
            .id_of(kind)
            .ok_or_else(|| StoreError::UnknownKind(kind.to_string()))?;
        let row = ComparisonRepo::insert(&self.pool, type_id, inputs).await?;
        Ok(row.into_job()?)
    }

    async fn get(&self, id: DbId) -> Result<Option<ComparisonJob>, StoreError> {
        match ComparisonRepo::find_by_id(&self.pool, id).await? {
            Some(row) => Ok(Some(row.into_job()?)),
            None => Ok(None),
        }
    }

    async fn list(&self, query: &ComparisonListQuery) -> Result<Vec<ComparisonJob>, StoreError> {
        let rows = ComparisonRepo::list(&self.pool, query).await?;
        rows.into_iter()
            .map(|row| row.into_job().map_err(StoreError::from))
            .collect()
    }

    async fn difference_rows(
        &self,
        query: &ComparisonListQuery,
    ) -> Result<Vec<DifferenceRow>, StoreError> {
        let rows = ComparisonRepo::list_with_differences(&self.pool, query).await?;
        rows.into_iter()
            .map(|row| -> Result<DifferenceRow, StoreError> {
                let (comparison, difference) = row.into_parts()?;
                Ok(DifferenceRow {
                    comparison,
                    difference,
                })
            })
            .collect()
    }

    async fn type_rows(&self) -> Result<Vec<TypeRow>, StoreError> {
        let rows = ComparisonRepo::list_by_type(&self.pool).await?;
        rows.into_iter()
            .map(|row| -> Result<TypeRow, StoreError> {
                let (comparison_type, comparison) = row.into_parts()?;
                Ok(TypeRow {
                    comparison_type,
                    comparison,
                })
            })
            .collect()
    }

    async fn mark_running(&self, id: DbId) -> Result<ComparisonJob, StoreError> {
        match ComparisonRepo::claim(&self.pool, id).await? {
            Some(row) => Ok(row.into_job()?),
            None => Err(self.rejected(id, ComparisonState::Running).await),
        }
    }

    async fn mark_done(&self, id: DbId, report: &DiffReport) -> Result<(), StoreError> {
        if ComparisonRepo::complete(&self.pool, id, report).await? {
            Ok(())
        } else {
            Err(self.rejected(id, ComparisonState::Done).await)
        }
    }

    async fn mark_failed(&self, id: DbId, error: &JobError) -> Result<(), StoreError> {
        if ComparisonRepo::fail(&self.pool, id, error).await? {
            Ok(())
        } else {
            Err(self.rejected(id, ComparisonState::Failed).await)
        }
    }

    async fn ping(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }
}
