//! Repository for the `comparisons` and `differences` tables.
//!
//! State changes are compare-and-swap updates guarded by the expected
//! predecessor state (see [`ComparisonState::predecessor`]). A guard miss
//! returns `None`/`false` and leaves the row untouched.

use std::borrow::Cow;

use archdiffer_core::comparison::{ArtifactPair, DiffRecord, DiffReport, JobError};
use archdiffer_core::status::{ComparisonState, StatusId};
use archdiffer_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::comparison::{
    ComparisonListQuery, ComparisonRow, DifferenceJoinRow, TypeJoinRow,
};

/// Column list for full comparison rows; expects `comparisons c` joined
/// with `comparison_types t`.
const COLUMNS: &str = "\
    c.id, t.name AS kind, c.state_id, c.inputs, c.result, c.error, \
    c.created_at, c.started_at, c.completed_at";

/// Column list for listing summaries.
const SUMMARY_COLUMNS: &str = "c.id, t.name AS kind, c.state_id, c.created_at, c.completed_at";

const FROM: &str = "comparisons c JOIN comparison_types t ON t.id = c.comparison_type_id";

/// WHERE clause for a listing query, starting at bind index 1.
///
/// Returns the clause and the next free bind index. Binds must be applied
/// in the order kind, state, created_before, as `bind_filters!` does.
fn where_clause(params: &ComparisonListQuery) -> (String, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx: u32 = 1;

    if params.kind.is_some() {
        conditions.push(format!("t.name = ${bind_idx}"));
        bind_idx += 1;
    }
    if params.state.is_some() {
        conditions.push(format!("c.state_id = ${bind_idx}"));
        bind_idx += 1;
    }
    if params.created_before.is_some() {
        conditions.push(format!("c.created_at < ${bind_idx}"));
        bind_idx += 1;
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (clause, bind_idx)
}

macro_rules! bind_filters {
    ($q:expr, $params:expr) => {{
        let mut q = $q;
        if let Some(kind) = &$params.kind {
            q = q.bind(kind.clone());
        }
        if let Some(state) = $params.state {
            q = q.bind(state.id());
        }
        if let Some(before) = $params.created_before {
            q = q.bind(before);
        }
        q.bind($params.clamped_limit()).bind($params.clamped_offset())
    }};
}

pub struct ComparisonRepo;

impl ComparisonRepo {
    /// Insert a new comparison in state `new`.
    pub async fn insert(
        pool: &PgPool,
        type_id: i16,
        inputs: &ArtifactPair,
    ) -> Result<ComparisonRow, sqlx::Error> {
        let query = format!(
            "WITH c AS ( \
                 INSERT INTO comparisons (comparison_type_id, state_id, inputs) \
                 VALUES ($1, $2, $3) \
                 RETURNING * \
             ) \
             SELECT {COLUMNS} FROM c JOIN comparison_types t ON t.id = c.comparison_type_id"
        );
        sqlx::query_as::<_, ComparisonRow>(&query)
            .bind(type_id)
            .bind(ComparisonState::New.id())
            .bind(Json(inputs))
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ComparisonRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM {FROM} WHERE c.id = $1");
        sqlx::query_as::<_, ComparisonRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Current state id of a comparison, if it exists.
    pub async fn state_of(pool: &PgPool, id: DbId) -> Result<Option<StatusId>, sqlx::Error> {
        sqlx::query_scalar::<_, StatusId>("SELECT state_id FROM comparisons WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Filtered, ordered, paginated comparisons.
    pub async fn list(
        pool: &PgPool,
        params: &ComparisonListQuery,
    ) -> Result<Vec<ComparisonRow>, sqlx::Error> {
        let (where_clause, bind_idx) = where_clause(params);
        let order = params.sort_order().as_sql();
        let query = format!(
            "SELECT {COLUMNS} FROM {FROM} \
             {where_clause} \
             ORDER BY c.id {order} \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );
        bind_filters!(sqlx::query_as::<_, ComparisonRow>(&query), params)
            .fetch_all(pool)
            .await
    }

    /// Flat `comparisons LEFT JOIN differences` rows for one page of
    /// comparisons, ordered by comparison id then difference id.
    pub async fn list_with_differences(
        pool: &PgPool,
        params: &ComparisonListQuery,
    ) -> Result<Vec<DifferenceJoinRow>, sqlx::Error> {
        let (where_clause, bind_idx) = where_clause(params);
        let order = params.sort_order().as_sql();
        let query = format!(
            "WITH page AS ( \
                 SELECT {SUMMARY_COLUMNS} FROM {FROM} \
                 {where_clause} \
                 ORDER BY c.id {order} \
                 LIMIT ${bind_idx} OFFSET ${} \
             ) \
             SELECT page.id, page.kind, page.state_id, page.created_at, page.completed_at, \
                    d.id AS difference_id, d.category, d.diff_type, d.diff_info \
             FROM page \
             LEFT JOIN differences d ON d.comparison_id = page.id \
             ORDER BY page.id {order}, d.id ASC",
            bind_idx + 1,
        );
        bind_filters!(sqlx::query_as::<_, DifferenceJoinRow>(&query), params)
            .fetch_all(pool)
            .await
    }

    /// Flat `comparison_types LEFT JOIN comparisons` rows, ordered by type id
    /// then comparison id.
    pub async fn list_by_type(pool: &PgPool) -> Result<Vec<TypeJoinRow>, sqlx::Error> {
        sqlx::query_as::<_, TypeJoinRow>(
            "SELECT t.id AS type_id, t.name AS type_name, \
                    c.id AS comparison_id, c.state_id, c.created_at, c.completed_at \
             FROM comparison_types t \
             LEFT JOIN comparisons c ON c.comparison_type_id = t.id \
             ORDER BY t.id, c.id",
        )
        .fetch_all(pool)
        .await
    }

    /// Move a comparison from `new` to `running`, stamping `started_at`.
    pub async fn claim(pool: &PgPool, id: DbId) -> Result<Option<ComparisonRow>, sqlx::Error> {
        let query = format!(
            "WITH c AS ( \
                 UPDATE comparisons \
                 SET state_id = $2, started_at = NOW(), updated_at = NOW() \
                 WHERE id = $1 AND state_id = $3 \
                 RETURNING * \
             ) \
             SELECT {COLUMNS} FROM c JOIN comparison_types t ON t.id = c.comparison_type_id"
        );
        sqlx::query_as::<_, ComparisonRow>(&query)
            .bind(id)
            .bind(ComparisonState::Running.id())
            .bind(ComparisonState::New.id())
            .fetch_optional(pool)
            .await
    }

    /// Move a comparison from `running` to `done`, storing the report and
    /// one `differences` row per record in a single transaction.
    ///
    /// Returns `false` if the comparison was not `running`.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        report: &DiffReport,
    ) -> Result<bool, sqlx::Error> {
        let report = storable_report(report);
        let mut tx = pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE comparisons \
             SET state_id = $2, result = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND state_id = $4",
        )
        .bind(id)
        .bind(ComparisonState::Done.id())
        .bind(Json(&*report))
        .bind(ComparisonState::Running.id())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if !report.is_empty() {
            let mut categories = Vec::with_capacity(report.len());
            let mut diff_types = Vec::with_capacity(report.len());
            let mut infos = Vec::with_capacity(report.len());
            for record in &report.differences {
                categories.push(record.category.clone());
                diff_types.push(record.diff_type.clone());
                infos.push(record.diff_info.clone());
            }

            sqlx::query(
                "INSERT INTO differences (comparison_id, category, diff_type, diff_info) \
                 SELECT $1, u.category, u.diff_type, u.diff_info \
                 FROM UNNEST($2::text[], $3::text[], $4::text[]) \
                     WITH ORDINALITY AS u(category, diff_type, diff_info, ord) \
                 ORDER BY u.ord",
            )
            .bind(id)
            .bind(&categories)
            .bind(&diff_types)
            .bind(&infos)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    /// Move a comparison from `running` to `failed`, storing the error.
    ///
    /// Returns `false` if the comparison was not `running`.
    pub async fn fail(pool: &PgPool, id: DbId, error: &JobError) -> Result<bool, sqlx::Error> {
        let updated = sqlx::query(
            "UPDATE comparisons \
             SET state_id = $2, error = $3, completed_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND state_id = $4",
        )
        .bind(id)
        .bind(ComparisonState::Failed.id())
        .bind(Json(storable_error(error)))
        .bind(ComparisonState::Running.id())
        .execute(pool)
        .await?;
        Ok(updated.rows_affected() > 0)
    }
}

// ---------------------------------------------------------------------------
// NUL scrubbing
// ---------------------------------------------------------------------------

// Postgres `text` and `jsonb` reject U+0000 (SQLSTATE 22P05), and procedure
// output is arbitrary bytes.

fn strip_nul(s: &str) -> Cow<'_, str> {
    if s.contains('\0') {
        Cow::Owned(s.replace('\0', ""))
    } else {
        Cow::Borrowed(s)
    }
}

fn storable_report(report: &DiffReport) -> Cow<'_, DiffReport> {
    let dirty = report.differences.iter().any(|r| {
        r.category.contains('\0') || r.diff_type.contains('\0') || r.diff_info.contains('\0')
    });
    if !dirty {
        return Cow::Borrowed(report);
    }
    Cow::Owned(DiffReport::new(
        report
            .differences
            .iter()
            .map(|r| DiffRecord {
                category: strip_nul(&r.category).into_owned(),
                diff_type: strip_nul(&r.diff_type).into_owned(),
                diff_info: strip_nul(&r.diff_info).into_owned(),
            })
            .collect(),
    ))
}

fn storable_error(error: &JobError) -> JobError {
    JobError {
        kind: error.kind,
        message: strip_nul(&error.message).into_owned(),
        output: error.output.as_deref().map(|o| strip_nul(o).into_owned()),
    }
}
