//! Handlers for the `/comparisons` and `/differences` resources.
//!
//! Submission returns as soon as the comparison is persisted and handed to
//! the dispatcher; clients poll `GET /comparisons/{id}` for the outcome.

use archdiffer_core::comparison::ArtifactPair;
use archdiffer_core::types::DbId;
use archdiffer_db::models::comparison::ComparisonListQuery;
use archdiffer_db::store::StoreError;
use archdiffer_pipeline::service::ServiceError;
use axum::extract::{Path, Query, State};
use axum::http::header::LOCATION;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /comparisons`.
#[derive(Debug, Deserialize)]
pub struct SubmitComparison {
    /// Comparison type name, e.g. `rpmdiff`.
    pub kind: String,
    /// `pkg1` and `pkg2` descriptors.
    #[serde(flatten)]
    pub inputs: ArtifactPair,
}

// ---------------------------------------------------------------------------
// Submit
// ---------------------------------------------------------------------------

/// POST /api/v1/comparisons
///
/// Create a comparison and enqueue it. Returns 201 with the `new` job and a
/// `Location` header pointing at its status resource.
pub async fn submit_comparison(
    State(state): State<AppState>,
    Json(input): Json<SubmitComparison>,
) -> AppResult<impl IntoResponse> {
    let submission = state
        .service
        .submit(&input.kind, input.inputs)
        .await
        .map_err(|e| match e {
            ServiceError::Store(StoreError::UnknownKind(kind)) => AppError::UnknownKind {
                kind,
                known: state.service.kinds().into_iter().map(|t| t.name).collect(),
            },
            other => other.into(),
        })?;

    let job = submission.job;
    tracing::info!(
        comparison_id = job.id,
        kind = %job.kind,
        dispatched = submission.dispatched,
        "Comparison accepted",
    );

    Ok((
        StatusCode::CREATED,
        [(LOCATION, format!("/api/v1/comparisons/{}", job.id))],
        Json(DataResponse { data: job }),
    ))
}

// ---------------------------------------------------------------------------
// Poll
// ---------------------------------------------------------------------------

/// GET /api/v1/comparisons/{id}
///
/// Current state of one comparison, with `result` or `error` once terminal.
pub async fn get_comparison(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = state.service.status(id).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Listings
// ---------------------------------------------------------------------------

/// GET /api/v1/comparisons
///
/// Supports optional `kind`, `state`, `created_before`, `order`, `limit` and
/// `offset` query parameters.
pub async fn list_comparisons(
    State(state): State<AppState>,
    Query(params): Query<ComparisonListQuery>,
) -> AppResult<impl IntoResponse> {
    let comparisons = state.service.list(&params).await?;
    Ok(Json(DataResponse { data: comparisons }))
}

/// GET /api/v1/differences
///
/// Same filters as the comparison listing. Each comparison carries its
/// differences under `differences`.
pub async fn list_differences(
    State(state): State<AppState>,
    Query(params): Query<ComparisonListQuery>,
) -> AppResult<impl IntoResponse> {
    let comparisons = state.service.list_with_differences(&params).await?;
    Ok(Json(DataResponse { data: comparisons }))
}
