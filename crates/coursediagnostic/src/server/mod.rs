use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::server::endpoints::{batch, cache, events, report, settings, status};
use crate::types::AppState;

mod endpoints;
mod types;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let course_router = Router::new()
        .route("/:course_id/report", get(report::get_report))
        .route("/:course_id/notification", get(report::get_notification));

    let admin_router = Router::new()
        .route(
            "/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
        .route("/cache_stats", get(cache::get_cache_stats))
        .route("/cache/invalidate", post(cache::invalidate_cache))
        .route("/batch/run", post(batch::post_batch_run));

    Router::new()
        .route("/health", get(status::get_health))
        .route("/events", post(events::post_event))
        .nest("/courses", course_router)
        .merge(admin_router)
        .with_state(app_state)
}
