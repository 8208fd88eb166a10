//! Detail table for the course report page.
//!
//! One row per settings toggle, in settings order, with the toggle's label,
//! the impact of a failure and the pass/fail status taken from the cached
//! results.

use super::config::{CheckSetting, DiagnosticSettings};
use super::processor::{failed_percentage, Severity};
use super::types::{CachedCourseReport, DiagnosticDetail};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportRow {
    pub setting: CheckSetting,
    pub label: &'static str,
    pub impact: Option<&'static str>,
    pub status: RowStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<DiagnosticDetail>,
}

/// Everything the report page shows for one course
#[derive(Debug, Clone, Serialize)]
pub struct CourseReportView {
    pub course_id: i64,
    pub failed_percentage: u8,
    pub severity: Option<Severity>,
    pub generated_at: DateTime<Utc>,
    pub rows: Vec<ReportRow>,
}

impl CourseReportView {
    pub fn new(settings: &DiagnosticSettings, report: &CachedCourseReport) -> Self {
        let failed_percentage = failed_percentage(&report.results);
        Self {
            course_id: report.course_id,
            failed_percentage,
            severity: Severity::for_percentage(failed_percentage),
            generated_at: report.generated_at,
            rows: build_rows(settings, report),
        }
    }
}

pub fn build_rows(settings: &DiagnosticSettings, report: &CachedCourseReport) -> Vec<ReportRow> {
    CheckSetting::ALL
        .iter()
        .map(|&setting| build_row(settings, report, setting))
        .collect()
}

fn build_row(
    settings: &DiagnosticSettings,
    report: &CachedCourseReport,
    setting: CheckSetting,
) -> ReportRow {
    let skipped = ReportRow {
        setting,
        label: label(setting),
        impact: None,
        status: RowStatus::Skipped,
        detail: None,
    };

    if !settings.is_enabled(setting) {
        return skipped;
    }

    let primary = report.result(setting.primary_test().name());
    match primary {
        Some(result) if result.passed => ReportRow {
            status: RowStatus::Pass,
            ..skipped
        },
        Some(result) => ReportRow {
            impact: Some(impact(setting)),
            status: RowStatus::Fail,
            detail: result.detail.clone(),
            ..skipped
        },
        // Only the gate ran, so it is the gate that failed.
        None if setting.tests().len() > 1
            && report.result(setting.tests()[0].name()).is_some() =>
        {
            ReportRow {
                impact: Some(not_set_impact(setting)),
                status: RowStatus::Fail,
                ..skipped
            }
        }
        // Enabled after this report was generated.
        None => skipped,
    }
}

pub fn label(setting: CheckSetting) -> &'static str {
    match setting {
        CheckSetting::StartDate => "Course start date",
        CheckSetting::EndDate => "Course end date",
        CheckSetting::Visibility => "Course visibility",
        CheckSetting::StudentEnrolment => "Student enrolments",
        CheckSetting::InactiveEnrolment => "Inactive user enrolments",
        CheckSetting::GroupMode => "Group mode",
        CheckSetting::SelfEnrolmentKey => "Self-enrolment contains a key",
        CheckSetting::AutoEnrolmentActionAfterPeriod => "Action after period - unenrol",
        CheckSetting::AutoEnrolmentStudentDataDeletion => "Student data deletion",
        CheckSetting::ExistingEnrolments => "Existing enrolments",
        CheckSetting::EnrolmentPluginsEnabled => "Enrolment plugins disabled",
        CheckSetting::ActivityCompletion => "Activity completion",
        CheckSetting::AssignmentDueDate => "Assignment due dates",
        CheckSetting::CourseSize => "Course size",
        CheckSetting::CourseVideo => "Course video size",
        CheckSetting::CourseAudio => "Course audio size",
    }
}

pub fn impact(setting: CheckSetting) -> &'static str {
    match setting {
        CheckSetting::StartDate => "This course's start date is in the future. Automatic enrolments are frozen, and won't be updated.",
        CheckSetting::EndDate => "This course's end date is in the past. Automatic enrolments are frozen, and won't be updated. If you're still using this course, you can change the end date on the settings page.",
        CheckSetting::Visibility => "This course is currently hidden. You can see it, but students can't.",
        CheckSetting::StudentEnrolment => "There are no students on this course.",
        CheckSetting::InactiveEnrolment => "There are 1 or more students enrolled on this course whose enrolment is suspended or has expired.",
        CheckSetting::GroupMode => "Group Mode has a value other than \"No Groups\" and no groups have been defined, or are empty.",
        CheckSetting::SelfEnrolmentKey => "Self-enrolment is enabled for this course, with no enrolment key. This means anybody can add themselves to this course.",
        CheckSetting::AutoEnrolmentActionAfterPeriod => "Auto enrolment is currently configured to unenrol students from this course once the end date has passed.",
        CheckSetting::AutoEnrolmentStudentDataDeletion => "Students will be unenrolled, or removed from all groups, after being removed from the corresponding class list. WARNING - DATA LOSS!",
        CheckSetting::ExistingEnrolments => "This course has no enabled automatic enrolment method.",
        CheckSetting::EnrolmentPluginsEnabled => "This course doesn't have any enrolment methods enabled.",
        CheckSetting::ActivityCompletion => "Completion tracking is set on activities, but completion is disabled for the course.",
        CheckSetting::AssignmentDueDate => "One or more assignments have no due date.",
        CheckSetting::CourseSize => "The files in this course exceed the configured size limit.",
        CheckSetting::CourseVideo => "The video files in this course exceed the configured size limit.",
        CheckSetting::CourseAudio => "The audio files in this course exceed the configured size limit.",
    }
}

/// Impact shown when the gate of a two-stage toggle failed.
pub fn not_set_impact(setting: CheckSetting) -> &'static str {
    match setting {
        CheckSetting::EndDate => "This course doesn't have an end date. Automatic enrolments won't work unless you add one. This is to protect old courses from accidental changes.",
        CheckSetting::SelfEnrolmentKey => "Self-enrolment is not enabled for this course.",
        other => impact(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::types::DiagnosticResult;

    fn result(name: &str, passed: bool) -> DiagnosticResult {
        DiagnosticResult {
            name: name.to_string(),
            passed,
            detail: None,
        }
    }

    fn row(rows: &[ReportRow], setting: CheckSetting) -> &ReportRow {
        rows.iter().find(|r| r.setting == setting).unwrap()
    }

    #[test]
    fn test_rows_follow_settings_and_results() {
        let settings = DiagnosticSettings {
            enabled: true,
            checks: vec![
                CheckSetting::StartDate,
                CheckSetting::EndDate,
                CheckSetting::Visibility,
                CheckSetting::SelfEnrolmentKey,
            ],
            ..DiagnosticSettings::default()
        };
        let report = CachedCourseReport {
            course_id: 9,
            results: vec![
                result("startdate", true),
                result("enddate_notset", false),
                result("visibility", false),
                result("selfenrolmentkey_notset", true),
                result("selfenrolmentkey", false),
            ],
            generated_at: Utc::now(),
        };

        let rows = build_rows(&settings, &report);
        assert_eq!(rows.len(), CheckSetting::ALL.len());

        assert_eq!(row(&rows, CheckSetting::StartDate).status, RowStatus::Pass);
        assert_eq!(row(&rows, CheckSetting::GroupMode).status, RowStatus::Skipped);

        let end_date = row(&rows, CheckSetting::EndDate);
        assert_eq!(end_date.status, RowStatus::Fail);
        assert_eq!(end_date.impact, Some(not_set_impact(CheckSetting::EndDate)));

        let key = row(&rows, CheckSetting::SelfEnrolmentKey);
        assert_eq!(key.status, RowStatus::Fail);
        assert_eq!(key.impact, Some(impact(CheckSetting::SelfEnrolmentKey)));

        let view = CourseReportView::new(&settings, &report);
        assert_eq!(view.failed_percentage, 60);
        assert_eq!(view.severity, Some(Severity::Warning));
    }

    #[test]
    fn test_toggle_enabled_after_report_is_skipped() {
        let settings = DiagnosticSettings {
            enabled: true,
            checks: vec![CheckSetting::CourseSize],
            ..DiagnosticSettings::default()
        };
        let report = CachedCourseReport {
            course_id: 9,
            results: vec![result("startdate", true)],
            generated_at: Utc::now(),
        };

        let rows = build_rows(&settings, &report);
        assert_eq!(row(&rows, CheckSetting::CourseSize).status, RowStatus::Skipped);
    }
}
