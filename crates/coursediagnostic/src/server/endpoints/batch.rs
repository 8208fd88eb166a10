use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::server::types::ApiErrorType;
use crate::types::AppState;

/// POST /batch/run
///
/// Runs one batch now and returns its summary, or `skipped` while another
/// run is in progress.
#[cfg_attr(test, axum_macros::debug_handler)]
pub async fn post_batch_run(State(s): State<Arc<AppState>>) -> Response {
    info!("POST /batch/run");

    match s.run_batch().await {
        Ok(Ok(outcome)) => (StatusCode::OK, Json(outcome)).into_response(),
        Ok(Err(e)) => {
            error!("Batch run failed: {}", e);
            ApiErrorType::from(e).into_response()
        }
        Err(e) => {
            error!("Batch task panicked: {}", e);
            ApiErrorType::from((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Batch run failed",
                Some(e.to_string()),
            ))
            .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CourseRecord, CourseSnapshot};
    use crate::diagnostic::CheckSetting;
    use crate::server::test_util::{body_json, state_with};

    #[tokio::test]
    async fn test_batch_run() {
        let snapshot = CourseSnapshot {
            courses: (1..=3).map(CourseRecord::new).collect(),
            ..CourseSnapshot::default()
        };
        let state = state_with(&snapshot, &[CheckSetting::StartDate]);

        let response = post_batch_run(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "completed");
        assert_eq!(body["evaluated"], 2);
        assert_eq!(body["next_cursor"], 0);
        assert_eq!(state.service.cache().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_skipped_while_running() {
        let snapshot = CourseSnapshot {
            courses: (1..=3).map(CourseRecord::new).collect(),
            ..CourseSnapshot::default()
        };
        let state = state_with(&snapshot, &[CheckSetting::StartDate]);

        let guard = state.batch_lock.try_lock().unwrap();
        let body = body_json(post_batch_run(State(state.clone())).await).await;
        assert_eq!(body["status"], "skipped");
        assert_eq!(body["reason"], "a batch run is already in progress");
        assert!(state.service.cache().is_empty());

        drop(guard);
        let body = body_json(post_batch_run(State(state.clone())).await).await;
        assert_eq!(body["status"], "completed");
    }

    #[tokio::test]
    async fn test_batch_skipped_without_tests() {
        let state = state_with(&CourseSnapshot::default(), &[]);
        let body = body_json(post_batch_run(State(state)).await).await;
        assert_eq!(body["status"], "skipped");
    }
}
