//! Error types for the course diagnostic subsystem.

use thiserror::Error;

/// Errors that can occur while evaluating or caching course diagnostics.
#[derive(Debug, Error, Clone)]
pub enum DiagnosticError {
    /// The backing store failed
    #[error("Database error: {message}")]
    Database { message: String },

    /// The course does not exist in the backing store
    #[error("Course {course_id} not found")]
    CourseNotFound { course_id: i64 },

    /// A configured test name has no registered predicate
    #[error("Unknown diagnostic test: {name}")]
    UnknownTest { name: String },

    /// A persisted setting could not be interpreted
    #[error("Invalid value for setting '{key}': {value}")]
    InvalidSetting { key: String, value: String },

    /// Diagnostics are switched off in the plugin settings
    #[error("Course diagnostics are not enabled")]
    Disabled,

    /// Service configuration or import file could not be read
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl DiagnosticError {
    /// Returns true if the error is caused by missing data rather than a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, DiagnosticError::CourseNotFound { .. })
    }

    /// Returns true if the error comes from settings rather than course data.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            DiagnosticError::UnknownTest { .. }
                | DiagnosticError::InvalidSetting { .. }
                | DiagnosticError::Config { .. }
        )
    }
}

impl From<rusqlite::Error> for DiagnosticError {
    fn from(err: rusqlite::Error) -> Self {
        DiagnosticError::Database {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DiagnosticError {
    fn from(err: serde_json::Error) -> Self {
        DiagnosticError::Config {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for DiagnosticError {
    fn from(err: std::io::Error) -> Self {
        DiagnosticError::Config {
            message: err.to_string(),
        }
    }
}
