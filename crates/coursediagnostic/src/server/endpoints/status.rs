use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;

use crate::types::AppState;

/// GET /health
#[cfg_attr(test, axum_macros::debug_handler)]
pub async fn get_health(State(s): State<Arc<AppState>>) -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "started_at": s.started_at,
            "address": s.config.bind_address(),
            "batch_interval_secs": s.config.batch_interval().map(|d| d.as_secs()),
            "cached_reports": s.service.cache().len(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CourseSnapshot;
    use crate::server::test_util::{body_json, state_with};

    #[tokio::test]
    async fn test_health() {
        let state = state_with(&CourseSnapshot::default(), &[]);
        let response = get_health(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["cached_reports"], 0);
        assert_eq!(body["address"], "127.0.0.1:8080");
        assert_eq!(body["batch_interval_secs"], 3600);
    }
}
