use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::info;

use super::AdminState;

/// Drop every cached page. A disabled cache has nothing to clear.
pub(super) async fn invalidate_cache(State(state): State<AdminState>) -> Response {
    if let Some(cache) = &state.cache {
        cache.clear();
        info!(target = "yatube::http::admin::cache", "response cache cleared by admin");
    }
    StatusCode::NO_CONTENT.into_response()
}
