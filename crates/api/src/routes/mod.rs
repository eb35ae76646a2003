pub mod comparison;
pub mod health;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /comparisons                 list, submit
/// /comparisons/{id}            poll one comparison
/// /differences                 comparisons with nested differences
/// /comparison-types            comparison types with nested comparisons
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/comparisons", comparison::router())
        .route("/differences", get(handlers::comparison::list_differences))
        .route(
            "/comparison-types",
            get(handlers::comparison_type::list_comparison_types),
        )
}
