use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::types::AppState;

#[derive(Debug, Deserialize)]
pub struct InvalidateParams {
    /// Only this course; every entry when absent
    pub courseid: Option<i64>,
}

/// GET /cache_stats
///
/// Returns cache statistics for monitoring.
#[cfg_attr(test, axum_macros::debug_handler)]
pub async fn get_cache_stats(State(s): State<Arc<AppState>>) -> Response {
    (StatusCode::OK, Json(s.service.cache().stats())).into_response()
}

/// POST /cache/invalidate
///
/// Drops one course's cached report, or all of them.
#[cfg_attr(test, axum_macros::debug_handler)]
pub async fn invalidate_cache(
    State(s): State<Arc<AppState>>,
    Query(params): Query<InvalidateParams>,
) -> Response {
    info!("POST /cache/invalidate (courseid={:?})", params.courseid);

    match params.courseid {
        Some(course_id) => {
            let removed = s.service.cache().invalidate(course_id);
            (
                StatusCode::OK,
                Json(json!({ "courseid": course_id, "removed": removed })),
            )
                .into_response()
        }
        None => {
            s.service.cache().clear();
            (StatusCode::OK, Json(json!({ "message": "Cache invalidated" }))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CourseSnapshot;
    use crate::diagnostic::CheckSetting;
    use crate::server::test_util::{body_json, state_with};
    use chrono::Utc;

    #[tokio::test]
    async fn test_invalidate_and_stats() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        snapshot.courses.push(crate::db::CourseRecord::new(3));
        let state = state_with(&snapshot, &[CheckSetting::Visibility]);
        state.service.course_viewed(2, Utc::now()).unwrap();
        state.service.course_viewed(3, Utc::now()).unwrap();

        let body = body_json(get_cache_stats(State(state.clone())).await).await;
        assert_eq!(body["total_entries"], 2);
        assert_eq!(body["misses"], 2);

        let response = invalidate_cache(
            State(state.clone()),
            Query(InvalidateParams { courseid: Some(2) }),
        )
        .await;
        assert_eq!(body_json(response).await["removed"], true);
        assert_eq!(state.service.cache().len(), 1);

        invalidate_cache(State(state.clone()), Query(InvalidateParams { courseid: None })).await;
        assert!(state.service.cache().is_empty());
    }
}
