mod cache;
mod groups;
mod health;
mod state;

pub use state::AdminState;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use super::middleware::{log_responses, set_request_context};

/// Operator surface, bound to its own address and never exposed publicly.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/_health/db", get(health::admin_health))
        .route("/cache/invalidate", post(cache::invalidate_cache))
        .route(
            "/groups",
            get(groups::admin_groups).post(groups::admin_group_create),
        )
        .route("/groups/{slug}/delete", post(groups::admin_group_delete))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}
