//! The `rpmdiff` comparator: RPM packages from dnf repositories compared
//! with `rpmdiff`.

pub mod parser;
pub mod procedure;
pub mod source;

use std::sync::Arc;

pub use parser::RpmdiffParser;
pub use procedure::RpmdiffProcedure;
pub use source::DnfRepositorySource;

use crate::plugin::ComparatorPlugin;

/// Comparison kind served by this plugin.
pub const KIND: &str = "rpmdiff";

/// Difference category reported by rpmdiff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Package header tags (`VERSION`, `RELEASE`, `SUMMARY`, ...).
    Tags,
    /// Provides, requires, conflicts and obsoletes.
    Prco,
    Files,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Tags => "tags",
            Category::Prco => "PRCO",
            Category::Files => "files",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiffType {
    Removed,
    Added,
    Changed,
    Renamed,
}

impl DiffType {
    pub fn as_str(self) -> &'static str {
        match self {
            DiffType::Removed => "removed",
            DiffType::Added => "added",
            DiffType::Changed => "changed",
            DiffType::Renamed => "renamed",
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word {
            "removed" => Some(DiffType::Removed),
            "added" => Some(DiffType::Added),
            "changed" => Some(DiffType::Changed),
            "renamed" => Some(DiffType::Renamed),
            _ => None,
        }
    }
}

/// Program locations for the rpmdiff plugin.
#[derive(Debug, Clone)]
pub struct RpmdiffSettings {
    pub dnf_program: String,
    pub rpmdiff_program: String,
}

impl Default for RpmdiffSettings {
    fn default() -> Self {
        Self {
            dnf_program: "dnf".to_string(),
            rpmdiff_program: "rpmdiff".to_string(),
        }
    }
}

/// Assemble the rpmdiff plugin.
pub fn plugin(settings: &RpmdiffSettings) -> ComparatorPlugin {
    ComparatorPlugin {
        kind: KIND.to_string(),
        source: Arc::new(DnfRepositorySource::new(&settings.dnf_program)),
        procedure: Arc::new(RpmdiffProcedure::new(&settings.rpmdiff_program)),
        parser: Arc::new(RpmdiffParser::new()),
    }
}
