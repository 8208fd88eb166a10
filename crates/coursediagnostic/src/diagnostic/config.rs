/// Plugin settings and the cached test-suite selection
use super::error::DiagnosticError;
use super::registry::DiagnosticTest;
use super::source::SettingsStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info};

pub const KEY_ENABLED: &str = "enablediagnostic";
pub const KEY_FILE_SIZE_LIMIT: &str = "filesizelimit";
pub const KEY_TIME_LIMIT: &str = "timelimit";
pub const KEY_AUTO_ENROLMENT_METHOD: &str = "autoenrolmentmethod";
pub const KEY_SITE_URL: &str = "siteurl";

/// Batch cursor; persisted next to the settings but never part of them.
pub const KEY_START_COURSE_INDEX: &str = "startcourseindex";

const DEFAULT_TIME_LIMIT_SECS: u64 = 300;
const DEFAULT_AUTO_ENROLMENT_METHOD: &str = "gudatabase";

/// A settings toggle that enables one or two diagnostic tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CheckSetting {
    #[serde(rename = "startdate")]
    StartDate,
    #[serde(rename = "enddate")]
    EndDate,
    #[serde(rename = "visibility")]
    Visibility,
    #[serde(rename = "studentenrolment")]
    StudentEnrolment,
    #[serde(rename = "inactiveenrolment")]
    InactiveEnrolment,
    #[serde(rename = "groupmode")]
    GroupMode,
    #[serde(rename = "selfenrolmentkey")]
    SelfEnrolmentKey,
    #[serde(rename = "autoenrolment_action_after_period")]
    AutoEnrolmentActionAfterPeriod,
    #[serde(rename = "autoenrolment_studentdatadeletion")]
    AutoEnrolmentStudentDataDeletion,
    #[serde(rename = "existingenrolments")]
    ExistingEnrolments,
    #[serde(rename = "enrolmentpluginsenabled")]
    EnrolmentPluginsEnabled,
    #[serde(rename = "activitycompletion")]
    ActivityCompletion,
    #[serde(rename = "assignmentduedate")]
    AssignmentDueDate,
    #[serde(rename = "coursesize")]
    CourseSize,
    #[serde(rename = "coursevideo")]
    CourseVideo,
    #[serde(rename = "courseaudio")]
    CourseAudio,
}

impl CheckSetting {
    /// Every toggle, in report and evaluation order.
    pub const ALL: [CheckSetting; 16] = [
        CheckSetting::StartDate,
        CheckSetting::EndDate,
        CheckSetting::Visibility,
        CheckSetting::StudentEnrolment,
        CheckSetting::InactiveEnrolment,
        CheckSetting::GroupMode,
        CheckSetting::SelfEnrolmentKey,
        CheckSetting::AutoEnrolmentActionAfterPeriod,
        CheckSetting::AutoEnrolmentStudentDataDeletion,
        CheckSetting::ExistingEnrolments,
        CheckSetting::EnrolmentPluginsEnabled,
        CheckSetting::ActivityCompletion,
        CheckSetting::AssignmentDueDate,
        CheckSetting::CourseSize,
        CheckSetting::CourseVideo,
        CheckSetting::CourseAudio,
    ];

    pub fn key(self) -> &'static str {
        match self {
            CheckSetting::StartDate => "startdate",
            CheckSetting::EndDate => "enddate",
            CheckSetting::Visibility => "visibility",
            CheckSetting::StudentEnrolment => "studentenrolment",
            CheckSetting::InactiveEnrolment => "inactiveenrolment",
            CheckSetting::GroupMode => "groupmode",
            CheckSetting::SelfEnrolmentKey => "selfenrolmentkey",
            CheckSetting::AutoEnrolmentActionAfterPeriod => "autoenrolment_action_after_period",
            CheckSetting::AutoEnrolmentStudentDataDeletion => "autoenrolment_studentdatadeletion",
            CheckSetting::ExistingEnrolments => "existingenrolments",
            CheckSetting::EnrolmentPluginsEnabled => "enrolmentpluginsenabled",
            CheckSetting::ActivityCompletion => "activitycompletion",
            CheckSetting::AssignmentDueDate => "assignmentduedate",
            CheckSetting::CourseSize => "coursesize",
            CheckSetting::CourseVideo => "coursevideo",
            CheckSetting::CourseAudio => "courseaudio",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.key() == key)
    }

    /// Tests run for this toggle. A two-element list is a gate followed by its dependent.
    pub fn tests(self) -> &'static [DiagnosticTest] {
        match self {
            CheckSetting::StartDate => &[DiagnosticTest::StartDate],
            CheckSetting::EndDate => &[DiagnosticTest::EndDateNotSet, DiagnosticTest::EndDate],
            CheckSetting::Visibility => &[DiagnosticTest::Visibility],
            CheckSetting::StudentEnrolment => &[DiagnosticTest::StudentEnrolment],
            CheckSetting::InactiveEnrolment => &[DiagnosticTest::InactiveEnrolment],
            CheckSetting::GroupMode => &[DiagnosticTest::GroupMode],
            CheckSetting::SelfEnrolmentKey => &[
                DiagnosticTest::SelfEnrolmentKeyNotSet,
                DiagnosticTest::SelfEnrolmentKey,
            ],
            CheckSetting::AutoEnrolmentActionAfterPeriod => {
                &[DiagnosticTest::AutoEnrolmentActionAfterPeriod]
            }
            CheckSetting::AutoEnrolmentStudentDataDeletion => {
                &[DiagnosticTest::AutoEnrolmentStudentDataDeletion]
            }
            CheckSetting::ExistingEnrolments => &[DiagnosticTest::ExistingEnrolments],
            CheckSetting::EnrolmentPluginsEnabled => &[DiagnosticTest::EnrolmentPluginsEnabled],
            CheckSetting::ActivityCompletion => &[DiagnosticTest::ActivityCompletion],
            CheckSetting::AssignmentDueDate => &[DiagnosticTest::AssignmentDueDate],
            CheckSetting::CourseSize => &[DiagnosticTest::CourseSize],
            CheckSetting::CourseVideo => &[DiagnosticTest::CourseVideo],
            CheckSetting::CourseAudio => &[DiagnosticTest::CourseAudio],
        }
    }

    /// The test whose result decides pass/fail for this toggle in the report.
    pub fn primary_test(self) -> DiagnosticTest {
        let tests = self.tests();
        tests[tests.len() - 1]
    }
}

/// Selectable file size thresholds for the size checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileSizeLimit {
    #[serde(rename = "100MB")]
    Mb100,
    #[serde(rename = "500MB")]
    Mb500,
    #[serde(rename = "1GB")]
    Gb1,
    #[serde(rename = "10GB")]
    Gb10,
    #[serde(rename = "100GB")]
    Gb100,
}

impl FileSizeLimit {
    /// Maps the stored option number (1-5).
    pub fn from_option(option: u8) -> Option<Self> {
        match option {
            1 => Some(FileSizeLimit::Mb100),
            2 => Some(FileSizeLimit::Mb500),
            3 => Some(FileSizeLimit::Gb1),
            4 => Some(FileSizeLimit::Gb10),
            5 => Some(FileSizeLimit::Gb100),
            _ => None,
        }
    }

    pub fn as_option(self) -> u8 {
        match self {
            FileSizeLimit::Mb100 => 1,
            FileSizeLimit::Mb500 => 2,
            FileSizeLimit::Gb1 => 3,
            FileSizeLimit::Gb10 => 4,
            FileSizeLimit::Gb100 => 5,
        }
    }

    pub fn bytes(self) -> u64 {
        const MB: u64 = 1 << 20;
        const GB: u64 = 1 << 30;
        match self {
            FileSizeLimit::Mb100 => 100 * MB,
            FileSizeLimit::Mb500 => 500 * MB,
            FileSizeLimit::Gb1 => GB,
            FileSizeLimit::Gb10 => 10 * GB,
            FileSizeLimit::Gb100 => 100 * GB,
        }
    }
}

/// Plugin settings as persisted in the name/value configuration table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSettings {
    pub enabled: bool,
    /// Enabled toggles; always kept in [`CheckSetting::ALL`] order
    #[serde(default)]
    pub checks: Vec<CheckSetting>,
    pub file_size_limit: FileSizeLimit,
    pub time_limit_secs: u64,
    pub auto_enrolment_method: String,
    #[serde(default)]
    pub site_url: Option<String>,
}

impl Default for DiagnosticSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            checks: Vec::new(),
            file_size_limit: FileSizeLimit::Gb1,
            time_limit_secs: DEFAULT_TIME_LIMIT_SECS,
            auto_enrolment_method: DEFAULT_AUTO_ENROLMENT_METHOD.to_string(),
            site_url: None,
        }
    }
}

impl DiagnosticSettings {
    /// Builds settings from raw configuration rows; unknown keys are ignored.
    pub fn from_config(config: &BTreeMap<String, String>) -> Result<Self, DiagnosticError> {
        let mut settings = Self::default();

        if let Some(value) = config.get(KEY_ENABLED) {
            settings.enabled = parse_flag(KEY_ENABLED, value)?;
        }

        settings.checks = CheckSetting::ALL
            .iter()
            .copied()
            .filter_map(|check| {
                config
                    .get(check.key())
                    .map(|value| parse_flag(check.key(), value).map(|on| on.then_some(check)))
            })
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect();

        if let Some(value) = config.get(KEY_FILE_SIZE_LIMIT) {
            settings.file_size_limit = value
                .trim()
                .parse::<u8>()
                .ok()
                .and_then(FileSizeLimit::from_option)
                .ok_or_else(|| invalid(KEY_FILE_SIZE_LIMIT, value))?;
        }

        if let Some(value) = config.get(KEY_TIME_LIMIT) {
            settings.time_limit_secs = value
                .trim()
                .parse::<u64>()
                .map_err(|_| invalid(KEY_TIME_LIMIT, value))?;
        }

        if let Some(value) = config.get(KEY_AUTO_ENROLMENT_METHOD) {
            if !value.trim().is_empty() {
                settings.auto_enrolment_method = value.trim().to_string();
            }
        }

        settings.site_url = config
            .get(KEY_SITE_URL)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Ok(settings)
    }

    /// Flattens the settings into configuration rows, one per key.
    pub fn to_config(&self) -> Vec<(String, String)> {
        let flag = |on: bool| if on { "1" } else { "0" }.to_string();

        let mut rows = vec![(KEY_ENABLED.to_string(), flag(self.enabled))];
        rows.extend(
            CheckSetting::ALL
                .iter()
                .map(|check| (check.key().to_string(), flag(self.checks.contains(check)))),
        );
        rows.push((
            KEY_FILE_SIZE_LIMIT.to_string(),
            self.file_size_limit.as_option().to_string(),
        ));
        rows.push((KEY_TIME_LIMIT.to_string(), self.time_limit_secs.to_string()));
        rows.push((
            KEY_AUTO_ENROLMENT_METHOD.to_string(),
            self.auto_enrolment_method.clone(),
        ));
        rows.push((
            KEY_SITE_URL.to_string(),
            self.site_url.clone().unwrap_or_default(),
        ));
        rows
    }

    pub fn load(store: &dyn SettingsStore) -> Result<Self, DiagnosticError> {
        Self::from_config(&store.all_config()?)
    }

    pub fn save(&self, store: &dyn SettingsStore) -> Result<(), DiagnosticError> {
        for (name, value) in self.to_config() {
            store.set_config(&name, &value)?;
        }
        info!(
            enabled = self.enabled,
            checks = self.checks.len(),
            "Saved course diagnostic settings"
        );
        Ok(())
    }

    pub fn is_enabled(&self, check: CheckSetting) -> bool {
        self.checks.contains(&check)
    }

    /// Number of enabled toggles.
    pub fn enabled_count(&self) -> usize {
        self.checks.len()
    }

    pub fn time_limit(&self) -> Duration {
        Duration::from_secs(self.time_limit_secs)
    }

    /// Puts toggles into canonical order and drops duplicates.
    pub fn normalise(mut self) -> Self {
        self.checks.sort();
        self.checks.dedup();
        self
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool, DiagnosticError> {
    match value.trim() {
        "1" | "true" => Ok(true),
        "" | "0" | "false" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &str) -> DiagnosticError {
    DiagnosticError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Process-wide snapshot of the settings.
///
/// Loaded from the store on first use and reused until [`invalidate`](Self::invalidate)
/// is called, so settings are not re-read on every course view.
#[derive(Default)]
pub struct SuiteSelection {
    snapshot: RwLock<Option<Arc<DiagnosticSettings>>>,
}

impl SuiteSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached snapshot, loading it from `store` if needed.
    pub fn current(&self, store: &dyn SettingsStore) -> Result<Arc<DiagnosticSettings>, DiagnosticError> {
        if let Some(settings) = self
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            return Ok(settings.clone());
        }

        let settings = Arc::new(DiagnosticSettings::load(store)?);
        debug!(
            enabled = settings.enabled,
            checks = settings.enabled_count(),
            "Loaded course diagnostic settings snapshot"
        );
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(settings.clone());
        Ok(settings)
    }

    /// Drops the snapshot; the next call to `current` reloads it.
    pub fn invalidate(&self) {
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}
