use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};

use crate::diagnostic::EventPayload;
use crate::server::types::ApiErrorType;
use crate::types::AppState;

/// POST /events
///
/// Accepts a host event, e.g. `{"eventname": "\\core\\event\\course_updated", "courseid": 7}`.
#[cfg_attr(test, axum_macros::debug_handler)]
pub async fn post_event(
    State(s): State<Arc<AppState>>,
    Json(payload): Json<EventPayload>,
) -> Response {
    info!("POST /events ({} for course {})", payload.eventname, payload.courseid);

    match s.service.handle_payload(&payload, Utc::now()) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => {
            error!("Failed to handle event {}: {}", payload.eventname, e);
            ApiErrorType::from(e).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CourseSnapshot;
    use crate::diagnostic::CheckSetting;
    use crate::server::test_util::{body_json, state_with};

    fn event(name: &str, courseid: i64) -> Json<EventPayload> {
        Json(EventPayload {
            eventname: name.to_string(),
            courseid,
        })
    }

    #[tokio::test]
    async fn test_events_drive_the_cache() {
        let snapshot = CourseSnapshot::single_course(2, |_| {});
        let state = state_with(&snapshot, &[CheckSetting::Visibility]);

        let response =
            post_event(State(state.clone()), event("\\core\\event\\course_viewed", 2)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["outcome"], "viewed");
        assert!(body["notification"].is_null());
        assert!(state.service.cache().contains(2));

        let response =
            post_event(State(state.clone()), event("\\core\\event\\course_updated", 2)).await;
        let body = body_json(response).await;
        assert_eq!(body["outcome"], "invalidated");
        assert_eq!(body["removed"], true);
        assert!(!state.service.cache().contains(2));

        let response =
            post_event(State(state), event("\\core\\event\\user_loggedin", 2)).await;
        assert_eq!(body_json(response).await["outcome"], "ignored");
    }
}
