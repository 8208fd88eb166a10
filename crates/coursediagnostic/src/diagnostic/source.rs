//! Data access used by the diagnostics.
//!
//! The diagnostics never query storage directly; everything they read goes
//! through [`CourseDataSource`], and plugin settings through [`SettingsStore`].
//! [`crate::db::CourseDbManager`] implements both on top of SQLite.

use super::error::DiagnosticError;
use super::types::{
    Course, CourseGroup, CourseModule, EnrolmentInstance, FileUsage, MimeFilter, UserEnrolment,
};
use std::collections::BTreeMap;

/// Read-only view of course data.
pub trait CourseDataSource: Send + Sync {
    /// Loads a single course, failing with `CourseNotFound` if it is missing.
    fn course(&self, course_id: i64) -> Result<Course, DiagnosticError>;

    /// All enrolment instances of a course, enabled or not.
    fn enrolment_instances(&self, course_id: i64) -> Result<Vec<EnrolmentInstance>, DiagnosticError>;

    /// Student-role enrolments across every instance of a course.
    fn student_enrolments(&self, course_id: i64) -> Result<Vec<UserEnrolment>, DiagnosticError>;

    fn groups(&self, course_id: i64) -> Result<Vec<CourseGroup>, DiagnosticError>;

    fn modules(&self, course_id: i64) -> Result<Vec<CourseModule>, DiagnosticError>;

    /// Count and total size of the course's files matching `filter`.
    fn file_usage(&self, course_id: i64, filter: MimeFilter) -> Result<FileUsage, DiagnosticError>;

    /// Ids of visible courses ordered by id, paged by `offset` and `limit`.
    fn visible_course_ids(&self, offset: usize, limit: usize) -> Result<Vec<i64>, DiagnosticError>;
}

/// Persisted name/value plugin configuration.
pub trait SettingsStore: Send + Sync {
    fn get_config(&self, name: &str) -> Result<Option<String>, DiagnosticError>;

    fn set_config(&self, name: &str, value: &str) -> Result<(), DiagnosticError>;

    fn all_config(&self) -> Result<BTreeMap<String, String>, DiagnosticError>;
}
