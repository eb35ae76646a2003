//! Comparison job data model.
//!
//! A [`ComparisonJob`] compares an ordered pair of artifacts described by
//! [`ArtifactDescriptor`]s. Descriptors are filters: they are resolved to a
//! concrete [`ArtifactCandidate`] by the worker at execution time and the
//! resolution is never written back onto the descriptor.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::error::CoreError;
use crate::status::ComparisonState;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

/// Input-side description of one artifact to compare.
///
/// Empty filter fields (`arch`, `epoch`, `version`, `release`) match any
/// value. `epoch` is accepted as either a JSON string or a number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ArtifactDescriptor {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[serde(default)]
    pub arch: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub epoch: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub release: String,
    /// Source repository locator (base URL or local path).
    #[validate(length(min = 1, message = "repository is required"))]
    pub repository: String,
}

impl ArtifactDescriptor {
    /// Whether `candidate` passes every non-empty filter of this descriptor.
    pub fn matches(&self, candidate: &ArtifactCandidate) -> bool {
        fn filter(wanted: &str, actual: &str) -> bool {
            wanted.is_empty() || wanted == actual
        }

        self.name == candidate.name
            && filter(&self.arch, &candidate.arch)
            && filter(&self.epoch, &candidate.epoch)
            && filter(&self.version, &candidate.version)
            && filter(&self.release, &candidate.release)
    }
}

/// One package of a repository inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactCandidate {
    pub name: String,
    pub epoch: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    /// Location of the package relative to its repository.
    pub location: String,
}

impl ArtifactCandidate {
    /// Canonical file name, `name-version-release.arch.rpm`.
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}-{}.{}.rpm",
            self.name, self.version, self.release, self.arch
        )
    }

    /// Fully qualified `name-epoch:version-release.arch` (NEVRA) string.
    pub fn nevra(&self) -> String {
        let epoch = if self.epoch.is_empty() { "0" } else { &self.epoch };
        format!(
            "{}-{}:{}-{}.{}",
            self.name, epoch, self.version, self.release, self.arch
        )
    }
}

/// The ordered pair of artifacts a job compares.
///
/// Serialized as `pkg1` / `pkg2`, which is also what clients submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPair {
    #[serde(rename = "pkg1")]
    pub left: ArtifactDescriptor,
    #[serde(rename = "pkg2")]
    pub right: ArtifactDescriptor,
}

impl ArtifactPair {
    pub fn new(left: ArtifactDescriptor, right: ArtifactDescriptor) -> Self {
        Self { left, right }
    }

    /// Validate both descriptors, reporting which side failed.
    pub fn validate_inputs(&self) -> Result<(), CoreError> {
        for (side, descriptor) in [("pkg1", &self.left), ("pkg2", &self.right)] {
            descriptor
                .validate()
                .map_err(|e| CoreError::Validation(format!("{side}: {e}")))?;
        }
        Ok(())
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => s,
        Some(Raw::Number(n)) => n.to_string(),
        None => String::new(),
    })
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One structured difference produced by a kind-specific result parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRecord {
    pub category: String,
    pub diff_type: String,
    pub diff_info: String,
}

/// Structured output of a successful comparison.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffReport {
    pub differences: Vec<DiffRecord>,
}

impl DiffReport {
    pub fn new(differences: Vec<DiffRecord>) -> Self {
        Self { differences }
    }

    pub fn len(&self) -> usize {
        self.differences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.differences.is_empty()
    }
}

/// A persisted difference row, as listed under its comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Difference {
    pub id: DbId,
    pub comparison_id: DbId,
    pub category: String,
    pub diff_type: String,
    pub diff_info: String,
}

/// Why a job ended in `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobErrorKind {
    /// Zero or more than one candidate matched a descriptor's filters.
    AmbiguousOrMissingArtifact,
    /// The artifact source could not be queried or the download failed.
    ArtifactFetchFailed,
    /// The external procedure could not be launched, timed out, or exited
    /// with a non-zero status.
    ComparisonProcedureFailed,
    ResultParsingFailed,
    /// No comparator plugin is registered for the job's kind.
    UnsupportedKind,
    Internal,
}

impl JobErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobErrorKind::AmbiguousOrMissingArtifact => "AmbiguousOrMissingArtifact",
            JobErrorKind::ArtifactFetchFailed => "ArtifactFetchFailed",
            JobErrorKind::ComparisonProcedureFailed => "ComparisonProcedureFailed",
            JobErrorKind::ResultParsingFailed => "ResultParsingFailed",
            JobErrorKind::UnsupportedKind => "UnsupportedKind",
            JobErrorKind::Internal => "Internal",
        }
    }
}

/// Failure detail recorded on a `failed` job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
    /// Captured procedure output, kept for diagnosis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl JobError {
    pub fn new(kind: JobErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            output: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// A comparison request and its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonJob {
    pub id: DbId,
    pub kind: String,
    pub state: ComparisonState,
    pub inputs: ArtifactPair,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DiffReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl ComparisonJob {
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn summary(&self) -> ComparisonSummary {
        ComparisonSummary {
            id: self.id,
            kind: self.kind.clone(),
            state: self.state,
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// Listing view of a job, without its inputs, result or error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComparisonSummary {
    pub id: DbId,
    pub kind: String,
    pub state: ComparisonState,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// A registered comparison type (plugin kind), e.g. `rpmdiff`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonType {
    pub id: i16,
    pub name: String,
}

/// Job description handed from the dispatcher to the worker pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMessage {
    pub comparison_id: DbId,
    pub kind: String,
    pub inputs: ArtifactPair,
}

impl JobMessage {
    pub fn for_job(job: &ComparisonJob) -> Self {
        Self {
            comparison_id: job.id,
            kind: job.kind.clone(),
            inputs: job.inputs.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> ArtifactCandidate {
        ArtifactCandidate {
            name: "python3".into(),
            epoch: "0".into(),
            version: "3.6.1".into(),
            release: "8.fc26".into(),
            arch: "x86_64".into(),
            location: "Packages/p/python3-3.6.1-8.fc26.x86_64.rpm".into(),
        }
    }

    fn descriptor() -> ArtifactDescriptor {
        ArtifactDescriptor {
            name: "python3".into(),
            arch: String::new(),
            epoch: String::new(),
            version: String::new(),
            release: String::new(),
            repository: "http://mirror.example/fedora/26/".into(),
        }
    }

    #[test]
    fn empty_filters_match_any_candidate_with_the_same_name() {
        assert!(descriptor().matches(&candidate()));
    }

    #[test]
    fn every_filter_must_agree() {
        let mut d = descriptor();
        d.version = "3.6.1".into();
        d.arch = "x86_64".into();
        assert!(d.matches(&candidate()));

        d.release = "4.fc25".into();
        assert!(!d.matches(&candidate()));

        let mut other = descriptor();
        other.name = "python2".into();
        assert!(!other.matches(&candidate()));
    }

    #[test]
    fn candidate_file_name_and_nevra() {
        let c = candidate();
        assert_eq!(c.file_name(), "python3-3.6.1-8.fc26.x86_64.rpm");
        assert_eq!(c.nevra(), "python3-0:3.6.1-8.fc26.x86_64");
    }

    #[test]
    fn epoch_accepts_numbers_and_strings() {
        let from_number: ArtifactDescriptor = serde_json::from_value(serde_json::json!({
            "name": "python3", "epoch": 0, "repository": "r"
        }))
        .unwrap();
        assert_eq!(from_number.epoch, "0");

        let from_string: ArtifactDescriptor = serde_json::from_value(serde_json::json!({
            "name": "python3", "epoch": "2", "repository": "r"
        }))
        .unwrap();
        assert_eq!(from_string.epoch, "2");

        let missing: ArtifactDescriptor = serde_json::from_value(serde_json::json!({
            "name": "python3", "repository": "r"
        }))
        .unwrap();
        assert_eq!(missing.epoch, "");
    }

    #[test]
    fn pair_uses_pkg_keys_on_the_wire() {
        let pair = ArtifactPair::new(descriptor(), descriptor());
        let json = serde_json::to_value(&pair).unwrap();
        assert!(json.get("pkg1").is_some());
        assert!(json.get("pkg2").is_some());
    }

    #[test]
    fn validation_names_the_failing_side() {
        let mut right = descriptor();
        right.repository = String::new();
        let err = ArtifactPair::new(descriptor(), right)
            .validate_inputs()
            .unwrap_err();
        assert!(err.to_string().contains("pkg2"), "{err}");
    }

    #[test]
    fn job_error_display_and_output() {
        let err = JobError::new(JobErrorKind::ComparisonProcedureFailed, "exit status 2")
            .with_output("rpmdiff: boom");
        assert_eq!(err.to_string(), "ComparisonProcedureFailed: exit status 2");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "ComparisonProcedureFailed");
        assert_eq!(json["output"], "rpmdiff: boom");
    }
}
