//! In-process [`JobStore`] and [`TaskQueue`] implementations.
//!
//! Both keep their state behind a single mutex, so every compare-and-swap
//! is a check-and-set under one lock. They also carry outage hooks
//! ([`MemoryJobStore::fail_writes`], [`MemoryTaskQueue::fail_pushes`]) for
//! exercising the retry and degraded paths.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use archdiffer_core::comparison::{
    ArtifactPair, ComparisonJob, Difference, DiffReport, JobError, JobMessage,
};
use archdiffer_core::status::ComparisonState;
use archdiffer_core::types::DbId;
use async_trait::async_trait;
use chrono::Utc;

use crate::models::comparison::{ComparisonListQuery, SortOrder};
use crate::models::comparison_type::ComparisonTypeTable;
use crate::queue::{Delivery, QueueError, TaskQueue};
use crate::store::{DifferenceRow, JobStore, StoreError, TypeRow};

/// Take one unit from an outage budget, returning `true` if the current
/// call should fail.
fn consume(budget: &AtomicU32) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

// ---------------------------------------------------------------------------
// Job store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreState {
    next_id: DbId,
    next_difference_id: DbId,
    jobs: BTreeMap<DbId, ComparisonJob>,
    differences: BTreeMap<DbId, Vec<Difference>>,
}

pub struct MemoryJobStore {
    types: Arc<ComparisonTypeTable>,
    state: Mutex<StoreState>,
    failing_writes: AtomicU32,
    offline: AtomicBool,
}

impl MemoryJobStore {
    pub fn new(types: Arc<ComparisonTypeTable>) -> Self {
        Self {
            types,
            state: Mutex::new(StoreState::default()),
            failing_writes: AtomicU32::new(0),
            offline: AtomicBool::new(false),
        }
    }

    /// Make the next `n` writes fail with [`StoreError::Unavailable`].
    pub fn fail_writes(&self, n: u32) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Fail every call, reads and pings included, until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn read(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".into()));
        }
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    fn write(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        if consume(&self.failing_writes) {
            return Err(StoreError::Unavailable("injected write failure".into()));
        }
        self.read()
    }

    /// Apply `f` to job `id` if it is in the predecessor state of `to`.
    fn transition<T>(
        &self,
        id: DbId,
        to: ComparisonState,
        f: impl FnOnce(&mut StoreState, DbId) -> T,
    ) -> Result<T, StoreError> {
        let mut state = self.write()?;
        let from = state.jobs.get(&id).ok_or(StoreError::NotFound(id))?.state;
        if !from.can_transition_to(to) {
            return Err(StoreError::IllegalTransition { id, from, to });
        }
        Ok(f(&mut state, id))
    }
}

fn page<'a>(state: &'a StoreState, query: &ComparisonListQuery) -> Vec<&'a ComparisonJob> {
    let accepted = |job: &&ComparisonJob| query.accepts(&job.summary());
    let offset = usize::try_from(query.clamped_offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(query.clamped_limit()).unwrap_or(0);
    match query.sort_order() {
        SortOrder::Asc => state.jobs.values().filter(accepted).skip(offset).take(limit).collect(),
        SortOrder::Desc => state
            .jobs
            .values()
            .rev()
            .filter(accepted)
            .skip(offset)
            .take(limit)
            .collect(),
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, kind: &str, inputs: &ArtifactPair) -> Result<ComparisonJob, StoreError> {
        if !self.types.contains(kind) {
            return Err(StoreError::UnknownKind(kind.to_string()));
        }
        let mut state = self.write()?;
        state.next_id += 1;
        let job = ComparisonJob {
            id: state.next_id,
            kind: kind.to_string(),
            state: ComparisonState::New,
            inputs: inputs.clone(),
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        state.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: DbId) -> Result<Option<ComparisonJob>, StoreError> {
        Ok(self.read()?.jobs.get(&id).cloned())
    }

    async fn list(&self, query: &ComparisonListQuery) -> Result<Vec<ComparisonJob>, StoreError> {
        let state = self.read()?;
        Ok(page(&state, query).into_iter().cloned().collect())
    }

    async fn difference_rows(
        &self,
        query: &ComparisonListQuery,
    ) -> Result<Vec<DifferenceRow>, StoreError> {
        let state = self.read()?;
        let mut rows = Vec::new();
        for job in page(&state, query) {
            let comparison = job.summary();
            match state.differences.get(&job.id) {
                Some(differences) if !differences.is_empty() => {
                    rows.extend(differences.iter().map(|d| DifferenceRow {
                        comparison: comparison.clone(),
                        difference: Some(d.clone()),
                    }));
                }
                _ => rows.push(DifferenceRow {
                    comparison,
                    difference: None,
                }),
            }
        }
        Ok(rows)
    }

    async fn type_rows(&self) -> Result<Vec<TypeRow>, StoreError> {
        let state = self.read()?;
        let mut rows = Vec::new();
        for comparison_type in self.types.types() {
            let before = rows.len();
            rows.extend(
                state
                    .jobs
                    .values()
                    .filter(|job| job.kind == comparison_type.name)
                    .map(|job| TypeRow {
                        comparison_type: comparison_type.clone(),
                        comparison: Some(job.summary()),
                    }),
            );
            if rows.len() == before {
                rows.push(TypeRow {
                    comparison_type,
                    comparison: None,
                });
            }
        }
        Ok(rows)
    }

    async fn mark_running(&self, id: DbId) -> Result<ComparisonJob, StoreError> {
        self.transition(id, ComparisonState::Running, |state, id| {
            let job = state.jobs.get_mut(&id).map(|job| {
                job.state = ComparisonState::Running;
                job.started_at = Some(Utc::now());
                job.clone()
            });
            job.ok_or(StoreError::NotFound(id))
        })?
    }

    async fn mark_done(&self, id: DbId, report: &DiffReport) -> Result<(), StoreError> {
        self.transition(id, ComparisonState::Done, |state, id| {
            let mut differences = Vec::with_capacity(report.len());
            for record in &report.differences {
                state.next_difference_id += 1;
                differences.push(Difference {
                    id: state.next_difference_id,
                    comparison_id: id,
                    category: record.category.clone(),
                    diff_type: record.diff_type.clone(),
                    diff_info: record.diff_info.clone(),
                });
            }
            state.differences.insert(id, differences);
            if let Some(job) = state.jobs.get_mut(&id) {
                job.state = ComparisonState::Done;
                job.result = Some(report.clone());
                job.completed_at = Some(Utc::now());
            }
        })
    }

    async fn mark_failed(&self, id: DbId, error: &JobError) -> Result<(), StoreError> {
        self.transition(id, ComparisonState::Failed, |state, id| {
            if let Some(job) = state.jobs.get_mut(&id) {
                job.state = ComparisonState::Failed;
                job.error = Some(error.clone());
                job.completed_at = Some(Utc::now());
            }
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Task queue
// ---------------------------------------------------------------------------

struct QueueEntry {
    message: JobMessage,
    attempts: u32,
    available_at: Instant,
}

#[derive(Default)]
struct QueueState {
    next_id: DbId,
    entries: BTreeMap<DbId, QueueEntry>,
}

/// In-process [`TaskQueue`] with the same lease semantics as the
/// Postgres queue: oldest visible message first, redelivered once its
/// lease runs out unless acknowledged.
#[derive(Default)]
pub struct MemoryTaskQueue {
    state: Mutex<QueueState>,
    failing_pushes: AtomicU32,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` pushes fail with [`QueueError::Unavailable`].
    pub fn fail_pushes(&self, n: u32) {
        self.failing_pushes.store(n, Ordering::SeqCst);
    }

    /// Messages stored, leased or not.
    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        self.state
            .lock()
            .map_err(|_| QueueError::Unavailable("queue lock poisoned".into()))
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn push(&self, message: &JobMessage) -> Result<(), QueueError> {
        if consume(&self.failing_pushes) {
            return Err(QueueError::Unavailable("injected push failure".into()));
        }
        let mut state = self.lock()?;
        state.next_id += 1;
        let id = state.next_id;
        state.entries.insert(
            id,
            QueueEntry {
                message: message.clone(),
                attempts: 0,
                available_at: Instant::now(),
            },
        );
        Ok(())
    }

    async fn pop(&self, lease: Duration) -> Result<Option<Delivery>, QueueError> {
        let mut state = self.lock()?;
        let now = Instant::now();
        let Some((id, entry)) = state
            .entries
            .iter_mut()
            .find(|(_, entry)| entry.available_at <= now)
        else {
            return Ok(None);
        };
        entry.available_at = now + lease;
        entry.attempts += 1;
        Ok(Some(Delivery {
            delivery_id: *id,
            message: entry.message.clone(),
            attempt: entry.attempts,
        }))
    }

    async fn ack(&self, delivery_id: DbId) -> Result<(), QueueError> {
        self.lock()?.entries.remove(&delivery_id);
        Ok(())
    }

    async fn queued(&self, comparison_ids: &[DbId]) -> Result<HashSet<DbId>, QueueError> {
        let state = self.lock()?;
        Ok(state
            .entries
            .values()
            .map(|entry| entry.message.comparison_id)
            .filter(|id| comparison_ids.contains(id))
            .collect())
    }
}
