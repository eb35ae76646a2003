//! Comparison lifecycle state, mapped to the `comparison_states` lookup table.
//!
//! The discriminants match the seed data order (1-based) of the table, so
//! [`ComparisonState::id`] can be bound directly into SQL.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// State ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Lifecycle of a comparison job.
///
/// ```text
/// new --(claimed)--> running --(diff stored)--> done
///                       \------(any failure)--> failed
/// ```
///
/// `done` and `failed` are terminal.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonState {
    New = 1,
    Running = 2,
    Done = 3,
    Failed = 4,
}

impl ComparisonState {
    /// Every state, in seed order.
    pub const ALL: [ComparisonState; 4] = [
        ComparisonState::New,
        ComparisonState::Running,
        ComparisonState::Done,
        ComparisonState::Failed,
    ];

    /// Return the database state ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Map a database state ID back to a state.
    pub fn from_id(id: StatusId) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.id() == id)
    }

    /// Lowercase wire name (`"new"`, `"running"`, `"done"`, `"failed"`).
    pub fn as_str(self) -> &'static str {
        match self {
            ComparisonState::New => "new",
            ComparisonState::Running => "running",
            ComparisonState::Done => "done",
            ComparisonState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ComparisonState::Done | ComparisonState::Failed)
    }

    /// Position in the partial order `new < running < {done, failed}`.
    ///
    /// Observed states of a single job never decrease in rank.
    pub fn rank(self) -> u8 {
        match self {
            ComparisonState::New => 0,
            ComparisonState::Running => 1,
            ComparisonState::Done | ComparisonState::Failed => 2,
        }
    }

    /// The only state a job may be in immediately before entering `self`.
    ///
    /// `new` has no predecessor: it is only ever assigned at creation.
    pub fn predecessor(self) -> Option<Self> {
        match self {
            ComparisonState::New => None,
            ComparisonState::Running => Some(ComparisonState::New),
            ComparisonState::Done | ComparisonState::Failed => Some(ComparisonState::Running),
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        next.predecessor() == Some(self)
    }
}

impl From<ComparisonState> for StatusId {
    fn from(value: ComparisonState) -> Self {
        value as StatusId
    }
}

impl fmt::Display for ComparisonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComparisonState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::Validation(format!("Unknown comparison state '{s}'")))
    }
}
