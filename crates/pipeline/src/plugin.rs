//! Comparator plugins: the kind-specific collaborators the worker drives.
//!
//! A plugin bundles three capabilities:
//!
//! - [`ArtifactSource`]: list a repository's candidates for a descriptor and
//!   download the chosen one.
//! - [`ComparisonProcedure`]: run the external diff over two local files.
//! - [`ResultParser`]: turn the procedure's output into [`DiffRecord`]s.
//!
//! Plugins are registered once at startup in a [`PluginRegistry`] keyed by
//! comparison kind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use archdiffer_core::comparison::{
    ArtifactCandidate, ArtifactDescriptor, DiffRecord, JobError, JobErrorKind,
};
use async_trait::async_trait;

use crate::process::ProcedureOutput;

#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    #[error("Expected exactly one artifact named '{name}', found {found}")]
    AmbiguousArtifact { name: String, found: usize },

    #[error("Artifact fetch failed: {0}")]
    Fetch(String),

    #[error("Comparison procedure failed: {message}")]
    Procedure {
        message: String,
        output: Option<String>,
    },

    #[error("Could not parse comparison output: {0}")]
    Parse(String),
}

impl PluginError {
    pub fn kind(&self) -> JobErrorKind {
        match self {
            PluginError::AmbiguousArtifact { .. } => JobErrorKind::AmbiguousOrMissingArtifact,
            PluginError::Fetch(_) => JobErrorKind::ArtifactFetchFailed,
            PluginError::Procedure { .. } => JobErrorKind::ComparisonProcedureFailed,
            PluginError::Parse(_) => JobErrorKind::ResultParsingFailed,
        }
    }
}

impl From<PluginError> for JobError {
    fn from(err: PluginError) -> Self {
        let kind = err.kind();
        match err {
            PluginError::Procedure {
                message,
                output: Some(output),
            } => JobError::new(kind, message).with_output(output),
            PluginError::Procedure { message, .. } => JobError::new(kind, message),
            other => JobError::new(kind, other.to_string()),
        }
    }
}

#[async_trait]
pub trait ArtifactSource: Send + Sync {
    /// Candidates in `descriptor.repository` named `descriptor.name`.
    ///
    /// The remaining filters are applied by the caller with
    /// [`ArtifactDescriptor::matches`].
    async fn resolve(
        &self,
        descriptor: &ArtifactDescriptor,
    ) -> Result<Vec<ArtifactCandidate>, PluginError>;

    /// Download `candidate` into `dir` and return the local file path.
    async fn materialize(
        &self,
        candidate: &ArtifactCandidate,
        descriptor: &ArtifactDescriptor,
        dir: &Path,
    ) -> Result<PathBuf, PluginError>;
}

#[async_trait]
pub trait ComparisonProcedure: Send + Sync {
    /// Compare two local artifacts.
    ///
    /// Returns `Err(PluginError::Procedure)` if the procedure could not be
    /// launched or reported failure. Which exit codes count as success is
    /// up to the procedure.
    async fn compare(&self, left: &Path, right: &Path) -> Result<ProcedureOutput, PluginError>;
}

pub trait ResultParser: Send + Sync {
    fn parse(&self, output: &[u8]) -> Result<Vec<DiffRecord>, PluginError>;
}

/// The capabilities registered for one comparison kind.
#[derive(Clone)]
pub struct ComparatorPlugin {
    pub kind: String,
    pub source: Arc<dyn ArtifactSource>,
    pub procedure: Arc<dyn ComparisonProcedure>,
    pub parser: Arc<dyn ResultParser>,
}

impl std::fmt::Debug for ComparatorPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComparatorPlugin")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Plugins keyed by comparison kind.
#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<ComparatorPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `plugin`, replacing any earlier plugin of the same kind.
    pub fn register(&mut self, plugin: ComparatorPlugin) -> &mut Self {
        tracing::debug!(kind = %plugin.kind, "Comparator plugin registered");
        self.plugins.insert(plugin.kind.clone(), Arc::new(plugin));
        self
    }

    pub fn get(&self, kind: &str) -> Option<Arc<ComparatorPlugin>> {
        self.plugins.get(kind).cloned()
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<_> = self.plugins.keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
