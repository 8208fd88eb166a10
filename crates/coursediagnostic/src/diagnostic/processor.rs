/// Aggregation of diagnostic results into a severity-banded notification
use super::types::{Course, DiagnosticResult};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Path of the per-course report, used in notification links.
pub const REPORT_PATH: &str = "/report/coursediagnostic/index.php";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    const BANDS: [(Severity, RangeInclusive<u8>); 3] = [
        (Severity::Info, 1..=34),
        (Severity::Warning, 35..=69),
        (Severity::Error, 70..=100),
    ];

    /// Band for a failure percentage; 0% has no severity.
    pub fn for_percentage(failed_percentage: u8) -> Option<Self> {
        Self::BANDS
            .iter()
            .find(|(_, range)| range.contains(&failed_percentage))
            .map(|(severity, _)| *severity)
    }

    pub fn message(self) -> &'static str {
        match self {
            Severity::Info => "The course has settings that need addressed.",
            Severity::Warning => "The course settings require your attention.",
            Severity::Error => "The course settings require urgent attention.",
        }
    }
}

/// Banner shown on a course page when diagnostics have failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub course_id: i64,
    pub severity: Severity,
    pub failed_percentage: u8,
    pub message: String,
    pub report_url: String,
}

/// Share of results that failed, as a rounded whole percentage.
///
/// An empty result set counts as nothing failed.
pub fn failed_percentage(results: &[DiagnosticResult]) -> u8 {
    let total = results.len();
    if total == 0 {
        return 0;
    }

    let passed = results.iter().filter(|r| r.passed).count();
    let failed = total - passed;
    (failed as f64 / total as f64 * 100.0).round() as u8
}

/// Builds the notification for a course, or `None` when nothing failed.
pub fn notification(course_id: i64, results: &[DiagnosticResult]) -> Option<Notification> {
    if Course::is_site_course(course_id) {
        return None;
    }

    let failed_percentage = failed_percentage(results);
    let severity = Severity::for_percentage(failed_percentage)?;

    Some(Notification {
        course_id,
        severity,
        failed_percentage,
        message: format!(
            "{} You can review what needs to be set on the report page.",
            severity.message()
        ),
        report_url: format!("{}?courseid={}", REPORT_PATH, course_id),
    })
}
