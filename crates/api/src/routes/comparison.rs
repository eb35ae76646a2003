use axum::routing::get;
use axum::Router;

use crate::handlers::comparison;
use crate::state::AppState;

/// Routes mounted at `/comparisons`.
///
/// ```text
/// GET    /                -> list_comparisons
/// POST   /                -> submit_comparison
/// GET    /{id}            -> get_comparison
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(comparison::list_comparisons).post(comparison::submit_comparison),
        )
        .route("/{id}", get(comparison::get_comparison))
}
