//! Per-course report and notification endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::server::types::ApiErrorType;
use crate::types::AppState;

/// GET /courses/:course_id/report
///
/// Returns the detail table for a course, computing it if nothing is cached.
#[cfg_attr(test, axum_macros::debug_handler)]
pub async fn get_report(
    Path(course_id): Path<i64>,
    State(s): State<Arc<AppState>>,
) -> Response {
    info!("GET /courses/{}/report", course_id);

    match s.service.report(course_id, Utc::now()) {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => {
            if !e.is_not_found() {
                error!("Failed to build report for course {}: {}", course_id, e);
            }
            ApiErrorType::from(e).into_response()
        }
    }
}

/// GET /courses/:course_id/notification
///
/// Runs the course-viewed flow. The body is `null` when there is nothing to show.
#[cfg_attr(test, axum_macros::debug_handler)]
pub async fn get_notification(
    Path(course_id): Path<i64>,
    State(s): State<Arc<AppState>>,
) -> Response {
    info!("GET /courses/{}/notification", course_id);

    match s.service.course_viewed(course_id, Utc::now()) {
        Ok(notification) => {
            (StatusCode::OK, Json(json!({ "notification": notification }))).into_response()
        }
        Err(e) => {
            error!("Failed to evaluate course {}: {}", course_id, e);
            ApiErrorType::from(e).into_response()
        }
    }
}
