use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/comparison-types
///
/// Every comparison type with its comparisons nested under `comparisons`.
pub async fn list_comparison_types(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let types = state.service.list_types().await?;
    Ok(Json(DataResponse { data: types }))
}
