//! Comparison rows, listing rows and the listing query DTO.

use archdiffer_core::comparison::{
    ArtifactPair, ComparisonJob, ComparisonSummary, ComparisonType, Difference, DiffReport,
    JobError,
};
use archdiffer_core::status::{ComparisonState, StatusId};
use archdiffer_core::types::{DbId, Timestamp};
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::FromRow;

/// Maximum page size for comparison listings.
pub const MAX_LIMIT: i64 = 100;

/// Default page size for comparison listings.
pub const DEFAULT_LIMIT: i64 = 50;

fn decode_state(state_id: StatusId) -> Result<ComparisonState, sqlx::Error> {
    ComparisonState::from_id(state_id)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown comparison state id {state_id}").into()))
}

/// A row from `comparisons` joined with its type name.
#[derive(Debug, Clone, FromRow)]
pub struct ComparisonRow {
    pub id: DbId,
    pub kind: String,
    pub state_id: StatusId,
    pub inputs: Json<ArtifactPair>,
    pub result: Option<Json<DiffReport>>,
    pub error: Option<Json<JobError>>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl ComparisonRow {
    pub fn into_job(self) -> Result<ComparisonJob, sqlx::Error> {
        Ok(ComparisonJob {
            id: self.id,
            kind: self.kind,
            state: decode_state(self.state_id)?,
            inputs: self.inputs.0,
            result: self.result.map(|r| r.0),
            error: self.error.map(|e| e.0),
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

/// Summary columns of a comparison, used by the grouped listings.
#[derive(Debug, Clone, FromRow)]
pub struct SummaryRow {
    pub id: DbId,
    pub kind: String,
    pub state_id: StatusId,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl SummaryRow {
    pub fn into_summary(self) -> Result<ComparisonSummary, sqlx::Error> {
        Ok(ComparisonSummary {
            id: self.id,
            kind: self.kind,
            state: decode_state(self.state_id)?,
            created_at: self.created_at,
            completed_at: self.completed_at,
        })
    }
}

/// One row of `comparisons LEFT JOIN differences`.
#[derive(Debug, Clone, FromRow)]
pub struct DifferenceJoinRow {
    #[sqlx(flatten)]
    pub comparison: SummaryRow,
    pub difference_id: Option<DbId>,
    pub category: Option<String>,
    pub diff_type: Option<String>,
    pub diff_info: Option<String>,
}

impl DifferenceJoinRow {
    pub fn into_parts(self) -> Result<(ComparisonSummary, Option<Difference>), sqlx::Error> {
        let comparison_id = self.comparison.id;
        let difference = match (self.difference_id, self.category, self.diff_type, self.diff_info) {
            (Some(id), Some(category), Some(diff_type), Some(diff_info)) => Some(Difference {
                id,
                comparison_id,
                category,
                diff_type,
                diff_info,
            }),
            _ => None,
        };
        Ok((self.comparison.into_summary()?, difference))
    }
}

/// One row of `comparison_types LEFT JOIN comparisons`.
#[derive(Debug, Clone, FromRow)]
pub struct TypeJoinRow {
    pub type_id: i16,
    pub type_name: String,
    pub comparison_id: Option<DbId>,
    pub state_id: Option<StatusId>,
    pub created_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
}

impl TypeJoinRow {
    pub fn into_parts(self) -> Result<(ComparisonType, Option<ComparisonSummary>), sqlx::Error> {
        let comparison = match (self.comparison_id, self.state_id, self.created_at) {
            (Some(id), Some(state_id), Some(created_at)) => Some(ComparisonSummary {
                id,
                kind: self.type_name.clone(),
                state: decode_state(state_id)?,
                created_at,
                completed_at: self.completed_at,
            }),
            _ => None,
        };
        let comparison_type = ComparisonType {
            id: self.type_id,
            name: self.type_name,
        };
        Ok((comparison_type, comparison))
    }
}

/// Listing direction by comparison id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Query parameters for comparison listings (`GET /api/v1/comparisons`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComparisonListQuery {
    /// Filter by comparison type name (e.g. `rpmdiff`).
    pub kind: Option<String>,
    /// Filter by lifecycle state.
    pub state: Option<ComparisonState>,
    /// Only comparisons created strictly before this instant.
    pub created_before: Option<Timestamp>,
    /// Ordering by id. Defaults to ascending.
    pub order: Option<SortOrder>,
    /// Maximum number of comparisons. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of comparisons to skip. Defaults to 0.
    pub offset: Option<i64>,
}

impl ComparisonListQuery {
    pub fn clamped_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn clamped_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn sort_order(&self) -> SortOrder {
        self.order.unwrap_or_default()
    }

    /// Whether `summary` passes the kind, state and age filters.
    pub fn accepts(&self, summary: &ComparisonSummary) -> bool {
        self.kind.as_deref().map_or(true, |k| k == summary.kind)
            && self.state.map_or(true, |s| s == summary.state)
            && self.created_before.map_or(true, |t| summary.created_at < t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_caps() {
        let q = ComparisonListQuery::default();
        assert_eq!(q.clamped_limit(), DEFAULT_LIMIT);
        assert_eq!(q.clamped_offset(), 0);

        let q = ComparisonListQuery {
            limit: Some(10_000),
            offset: Some(-3),
            ..Default::default()
        };
        assert_eq!(q.clamped_limit(), MAX_LIMIT);
        assert_eq!(q.clamped_offset(), 0);
    }

    #[test]
    fn deserializes_state_and_order() {
        let q: ComparisonListQuery =
            serde_json::from_value(serde_json::json!({"state": "done", "order": "desc"})).unwrap();
        assert_eq!(q.state, Some(ComparisonState::Done));
        assert_eq!(q.sort_order(), SortOrder::Desc);
    }

    #[test]
    fn type_join_row_without_comparison_has_no_child() {
        let row = TypeJoinRow {
            type_id: 1,
            type_name: "rpmdiff".into(),
            comparison_id: None,
            state_id: None,
            created_at: None,
            completed_at: None,
        };
        let (ty, child) = row.into_parts().unwrap();
        assert_eq!(ty.name, "rpmdiff");
        assert!(child.is_none());
    }
}
