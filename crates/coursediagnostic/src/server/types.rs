use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::diagnostic::DiagnosticError;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiErrorType {
    #[serde(skip)]
    status_code: StatusCode,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

impl From<(StatusCode, &str, Option<String>)> for ApiErrorType {
    fn from((status_code, error, context): (StatusCode, &str, Option<String>)) -> Self {
        Self {
            status_code,
            error: error.to_string(),
            context,
        }
    }
}

impl From<DiagnosticError> for ApiErrorType {
    fn from(err: DiagnosticError) -> Self {
        let (status, message) = match &err {
            DiagnosticError::CourseNotFound { .. } => (StatusCode::NOT_FOUND, "Course not found"),
            DiagnosticError::Disabled => (StatusCode::CONFLICT, "Course diagnostics are disabled"),
            DiagnosticError::UnknownTest { .. } | DiagnosticError::InvalidSetting { .. } => {
                (StatusCode::BAD_REQUEST, "Invalid diagnostic settings")
            }
            DiagnosticError::Database { .. } | DiagnosticError::Config { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
            }
        };

        Self::from((status, message, Some(err.to_string())))
    }
}

impl IntoResponse for ApiErrorType {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}
