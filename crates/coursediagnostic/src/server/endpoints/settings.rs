use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{error, info};

use crate::diagnostic::DiagnosticSettings;
use crate::server::types::ApiErrorType;
use crate::types::AppState;

/// GET /settings
#[cfg_attr(test, axum_macros::debug_handler)]
pub async fn get_settings(State(s): State<Arc<AppState>>) -> Response {
    match s.service.settings() {
        Ok(settings) => (StatusCode::OK, Json(settings.as_ref().clone())).into_response(),
        Err(e) => {
            error!("Failed to load settings: {}", e);
            ApiErrorType::from(e).into_response()
        }
    }
}

/// PUT /settings
///
/// Replaces the plugin settings. The next evaluation uses the new test selection.
#[cfg_attr(test, axum_macros::debug_handler)]
pub async fn put_settings(
    State(s): State<Arc<AppState>>,
    Json(settings): Json<DiagnosticSettings>,
) -> Response {
    info!("PUT /settings ({} checks enabled)", settings.enabled_count());

    if let Some(site_url) = settings.site_url.as_deref() {
        if let Err(e) = url::Url::parse(site_url) {
            return ApiErrorType::from((
                StatusCode::BAD_REQUEST,
                "Invalid site url",
                Some(e.to_string()),
            ))
            .into_response();
        }
    }

    match s.service.save_settings(settings) {
        Ok(saved) => (StatusCode::OK, Json(saved.as_ref().clone())).into_response(),
        Err(e) => {
            error!("Failed to save settings: {}", e);
            ApiErrorType::from(e).into_response()
        }
    }
}
