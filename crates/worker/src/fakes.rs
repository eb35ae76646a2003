//! Scriptable comparator plugin and fixtures for executor and pool tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use archdiffer_core::comparison::{
    ArtifactCandidate, ArtifactDescriptor, ArtifactPair, ComparisonJob, ComparisonType,
    DiffRecord, DiffReport, JobError,
};
use archdiffer_core::types::DbId;
use archdiffer_db::memory::MemoryJobStore;
use archdiffer_db::models::comparison::ComparisonListQuery;
use archdiffer_db::models::comparison_type::ComparisonTypeTable;
use archdiffer_db::store::{DifferenceRow, JobStore, StoreError, TypeRow};
use archdiffer_pipeline::plugin::{
    ArtifactSource, ComparatorPlugin, ComparisonProcedure, PluginError, PluginRegistry,
    ResultParser,
};
use archdiffer_pipeline::process::ProcedureOutput;
use async_trait::async_trait;

pub const KIND: &str = "fake";

/// Registered in the type table but without a plugin.
pub const ORPHAN_KIND: &str = "orphan";

pub fn types() -> Arc<ComparisonTypeTable> {
    Arc::new(ComparisonTypeTable::new([
        ComparisonType { id: 1, name: KIND.into() },
        ComparisonType { id: 2, name: ORPHAN_KIND.into() },
    ]))
}

pub fn candidate(name: &str, version: &str, arch: &str) -> ArtifactCandidate {
    ArtifactCandidate {
        name: name.into(),
        epoch: "0".into(),
        version: version.into(),
        release: "1.fc40".into(),
        arch: arch.into(),
        location: format!("Packages/{name}-{version}-1.fc40.{arch}.rpm"),
    }
}

pub fn descriptor(name: &str, version: &str, repository: &str) -> ArtifactDescriptor {
    ArtifactDescriptor {
        name: name.into(),
        arch: String::new(),
        epoch: String::new(),
        version: version.into(),
        release: String::new(),
        repository: repository.into(),
    }
}

pub fn inputs() -> ArtifactPair {
    ArtifactPair::new(descriptor("bash", "5.2.26", "repo-a"), descriptor("bash", "5.2.32", "repo-b"))
}

/// In-memory repositories: repository -> candidates.
#[derive(Default)]
pub struct FakeSource {
    repositories: Mutex<HashMap<String, Vec<ArtifactCandidate>>>,
    pub downloads: AtomicUsize,
    pub delay: Option<Duration>,
}

impl FakeSource {
    pub fn with(mut self, repository: &str, candidate: ArtifactCandidate) -> Self {
        self.repositories
            .get_mut()
            .unwrap()
            .entry(repository.to_string())
            .or_default()
            .push(candidate);
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ArtifactSource for FakeSource {
    async fn resolve(
        &self,
        descriptor: &ArtifactDescriptor,
    ) -> Result<Vec<ArtifactCandidate>, PluginError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let repositories = self.repositories.lock().unwrap();
        let Some(inventory) = repositories.get(&descriptor.repository) else {
            return Err(PluginError::Fetch(format!(
                "repository {} unreachable",
                descriptor.repository
            )));
        };
        Ok(inventory
            .iter()
            .filter(|c| c.name == descriptor.name)
            .cloned()
            .collect())
    }

    async fn materialize(
        &self,
        candidate: &ArtifactCandidate,
        _descriptor: &ArtifactDescriptor,
        dir: &Path,
    ) -> Result<PathBuf, PluginError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let path = dir.join(candidate.file_name());
        tokio::fs::write(&path, candidate.nevra())
            .await
            .map_err(|e| PluginError::Fetch(e.to_string()))?;
        Ok(path)
    }
}

/// What the fake procedure does when invoked.
#[derive(Clone)]
pub enum Script {
    Output(&'static str),
    Exit(i32, &'static str),
    Hang,
    /// Take the store offline for `n` writes, then succeed with the output.
    OutageThen(Arc<MemoryJobStore>, u32, &'static str),
    /// Sleep, then succeed; widens race windows.
    SlowOutput(Duration, &'static str),
}

pub struct FakeProcedure {
    pub calls: AtomicUsize,
    script: Script,
}

impl FakeProcedure {
    pub fn new(script: Script) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            script,
        }
    }
}

fn success(stdout: &str) -> ProcedureOutput {
    ProcedureOutput {
        exit_code: Some(0),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}

#[async_trait]
impl ComparisonProcedure for FakeProcedure {
    async fn compare(&self, left: &Path, right: &Path) -> Result<ProcedureOutput, PluginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(left.is_file() && right.is_file(), "inputs must be materialized");
        match &self.script {
            Script::Output(out) => Ok(success(out)),
            Script::Exit(code, stderr) => Err(PluginError::Procedure {
                message: format!("fake exited with status {code}"),
                output: Some((*stderr).to_string()),
            }),
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(success(""))
            }
            Script::OutageThen(store, writes, out) => {
                store.fail_writes(*writes);
                Ok(success(out))
            }
            Script::SlowOutput(delay, out) => {
                tokio::time::sleep(*delay).await;
                Ok(success(out))
            }
        }
    }
}

/// Parses `category,diff_type,diff_info` lines; anything else is an error.
pub struct CsvParser;

impl ResultParser for CsvParser {
    fn parse(&self, output: &[u8]) -> Result<Vec<DiffRecord>, PluginError> {
        let text = std::str::from_utf8(output).map_err(|e| PluginError::Parse(e.to_string()))?;
        text.lines()
            .filter(|l| !l.is_empty())
            .map(|line| match line.splitn(3, ',').collect::<Vec<_>>()[..] {
                [category, diff_type, diff_info] => Ok(DiffRecord {
                    category: category.into(),
                    diff_type: diff_type.into(),
                    diff_info: diff_info.into(),
                }),
                _ => Err(PluginError::Parse(format!("bad line: {line}"))),
            })
            .collect()
    }
}

pub fn registry(source: Arc<FakeSource>, procedure: Arc<FakeProcedure>) -> Arc<PluginRegistry> {
    let mut registry = PluginRegistry::new();
    registry.register(ComparatorPlugin {
        kind: KIND.into(),
        source,
        procedure,
        parser: Arc::new(CsvParser),
    });
    Arc::new(registry)
}

/// Both default repositories, one matching package each.
pub fn standard_source() -> FakeSource {
    FakeSource::default()
        .with("repo-a", candidate("bash", "5.2.26", "x86_64"))
        .with("repo-b", candidate("bash", "5.2.32", "x86_64"))
}

/// Delegates to a [`MemoryJobStore`] but rejects some terminal writes the
/// way Postgres does, with errors no retry gets past.
pub struct RejectingStore {
    pub inner: Arc<MemoryJobStore>,
    /// Reject every `mark_done`.
    pub reject_reports: bool,
}

impl RejectingStore {
    pub fn new(inner: Arc<MemoryJobStore>, reject_reports: bool) -> Self {
        Self { inner, reject_reports }
    }
}

#[async_trait]
impl JobStore for RejectingStore {
    async fn create(&self, kind: &str, inputs: &ArtifactPair) -> Result<ComparisonJob, StoreError> {
        self.inner.create(kind, inputs).await
    }

    async fn get(&self, id: DbId) -> Result<Option<ComparisonJob>, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self, query: &ComparisonListQuery) -> Result<Vec<ComparisonJob>, StoreError> {
        self.inner.list(query).await
    }

    async fn difference_rows(
        &self,
        query: &ComparisonListQuery,
    ) -> Result<Vec<DifferenceRow>, StoreError> {
        self.inner.difference_rows(query).await
    }

    async fn type_rows(&self) -> Result<Vec<TypeRow>, StoreError> {
        self.inner.type_rows().await
    }

    async fn mark_running(&self, id: DbId) -> Result<ComparisonJob, StoreError> {
        self.inner.mark_running(id).await
    }

    async fn mark_done(&self, id: DbId, report: &DiffReport) -> Result<(), StoreError> {
        if self.reject_reports {
            return Err(StoreError::Database(sqlx::Error::ColumnNotFound("result".into())));
        }
        self.inner.mark_done(id, report).await
    }

    /// Errors carrying NUL bytes are refused, as `jsonb` does.
    async fn mark_failed(&self, id: DbId, error: &JobError) -> Result<(), StoreError> {
        let has_nul = error.message.contains('\0')
            || error.output.as_deref().is_some_and(|o| o.contains('\0'));
        if has_nul {
            return Err(StoreError::Database(sqlx::Error::Encode(
                "unsupported Unicode escape sequence".into(),
            )));
        }
        self.inner.mark_failed(id, error).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}
