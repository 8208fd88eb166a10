/// Types for course diagnostic data
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Course id of the site front page, which is never diagnosed.
pub const SITE_COURSE_ID: i64 = 1;

/// Role id given to students in enrolment records.
pub const STUDENT_ROLE_ID: i64 = 5;

/// Course settings read by the diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub short_name: String,
    pub full_name: String,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub visible: bool,
    pub group_mode: GroupMode,
    pub completion_enabled: bool,
}

impl Course {
    /// Site-level course records are excluded from every diagnostic flow.
    pub fn is_site_course(course_id: i64) -> bool {
        course_id <= SITE_COURSE_ID
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupMode {
    NoGroups,
    Separate,
    Visible,
}

impl GroupMode {
    /// Maps the stored integer setting; unknown values are treated as separate groups.
    pub fn from_setting(value: i64) -> Self {
        match value {
            0 => GroupMode::NoGroups,
            2 => GroupMode::Visible,
            _ => GroupMode::Separate,
        }
    }

    pub fn as_setting(self) -> i64 {
        match self {
            GroupMode::NoGroups => 0,
            GroupMode::Separate => 1,
            GroupMode::Visible => 2,
        }
    }
}

/// One configured enrolment method on a course
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrolmentInstance {
    pub id: i64,
    pub course_id: i64,
    pub method: String,                        // e.g., "self", "manual", "gudatabase"
    pub name: Option<String>,
    pub enabled: bool,
    pub has_key: bool,
    pub enrol_period_secs: i64,
    pub enrol_end_date: Option<DateTime<Utc>>,
    pub unenrol_on_expiry: bool,               // "Action after period" is unenrol
    pub unenrol_on_removal: bool,
    pub remove_from_groups: bool,
}

impl EnrolmentInstance {
    /// Name shown in report links, falling back to the method type.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.method)
    }

    /// True if the instance limits enrolment by a period or an end date.
    pub fn has_time_limit(&self) -> bool {
        self.enrol_period_secs > 0 || self.enrol_end_date.is_some()
    }
}

/// A student's enrolment in a course
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserEnrolment {
    pub user_id: i64,
    pub suspended: bool,
    pub time_end: Option<DateTime<Utc>>,
}

impl UserEnrolment {
    /// An enrolment is inactive once suspended or past its end time.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        !self.suspended && self.time_end.map_or(true, |end| end >= now)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseGroup {
    pub id: i64,
    pub name: String,
    pub member_count: usize,
}

/// An activity or resource on the course page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseModule {
    pub id: i64,
    pub module_type: String,                   // e.g., "assign", "forum"
    pub name: String,
    pub completion_tracking: bool,
    pub due_date: Option<DateTime<Utc>>,
}

impl CourseModule {
    pub fn is_assignment(&self) -> bool {
        self.module_type == "assign"
    }
}

/// Aggregated size of the files stored in a course
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUsage {
    pub file_count: u64,
    pub total_bytes: u64,
}

/// Restricts a file usage query to a family of MIME types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MimeFilter {
    All,
    Video,
    Audio,
}

impl MimeFilter {
    pub fn mime_types(self) -> &'static [&'static str] {
        match self {
            MimeFilter::All => &[],
            MimeFilter::Video => &[
                "video/mp4",
                "video/mpeg",
                "video/ogg",
                "video/quicktime",
                "video/webm",
                "video/x-flv",
                "video/x-ms-asf",
                "video/x-ms-wm",
                "video/x-ms-wmv",
            ],
            MimeFilter::Audio => &[
                "audio/aac",
                "audio/au",
                "audio/mp3",
                "audio/mp4",
                "audio/ogg",
                "audio/wav",
                "audio/x-aiff",
                "audio/x-mpegurl",
                "audio/x-ms-wma",
            ],
        }
    }
}

/// A link to the page where a failing setting can be fixed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLink {
    pub label: String,
    pub url: String,
}

/// Supporting data surfaced next to a result in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticDetail {
    Links {
        links: Vec<ReportLink>,
        plural: bool,
    },
    FileSize {
        total_files: u64,
        total_size: String,
        size_limit: String,
    },
}

impl DiagnosticDetail {
    /// Builds a link list, marking it plural when more than one item is listed.
    pub fn links(links: Vec<ReportLink>) -> Self {
        let plural = links.len() > 1;
        DiagnosticDetail::Links { links, plural }
    }
}

/// The outcome of a single diagnostic test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<DiagnosticDetail>,
}

/// Snapshot of all results for one course
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedCourseReport {
    pub course_id: i64,
    pub results: Vec<DiagnosticResult>,
    pub generated_at: DateTime<Utc>,
}

impl CachedCourseReport {
    pub fn result(&self, name: &str) -> Option<&DiagnosticResult> {
        self.results.iter().find(|r| r.name == name)
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }
}

/// Formats a byte count using binary units and one decimal place.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [(u64, &str); 4] = [
        (1 << 40, "TB"),
        (1 << 30, "GB"),
        (1 << 20, "MB"),
        (1 << 10, "KB"),
    ];

    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let (divisor, unit) = UNITS
        .iter()
        .copied()
        .find(|(divisor, _)| bytes >= *divisor)
        .unwrap_or((1 << 10, "KB"));

    // Halves round away from zero.
    let rounded = (bytes as f64 / divisor as f64 * 10.0).round() / 10.0;
    let value = format!("{:.1}", rounded);
    let value = value.strip_suffix(".0").unwrap_or(&value);
    format!("{} {}", value, unit)
}
