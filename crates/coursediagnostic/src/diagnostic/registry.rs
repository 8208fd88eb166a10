//! Maps configured test names to their checks and runs a suite in order.

use super::checks::{self, CheckContext, CheckResult};
use super::config::DiagnosticSettings;
use super::error::DiagnosticError;
use super::types::DiagnosticResult;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, trace};

/// Every diagnostic test the service knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticTest {
    StartDate,
    EndDateNotSet,
    EndDate,
    Visibility,
    StudentEnrolment,
    InactiveEnrolment,
    GroupMode,
    SelfEnrolmentKeyNotSet,
    SelfEnrolmentKey,
    AutoEnrolmentActionAfterPeriod,
    AutoEnrolmentStudentDataDeletion,
    ExistingEnrolments,
    EnrolmentPluginsEnabled,
    ActivityCompletion,
    AssignmentDueDate,
    CourseSize,
    CourseVideo,
    CourseAudio,
}

impl DiagnosticTest {
    pub const ALL: [DiagnosticTest; 18] = [
        DiagnosticTest::StartDate,
        DiagnosticTest::EndDateNotSet,
        DiagnosticTest::EndDate,
        DiagnosticTest::Visibility,
        DiagnosticTest::StudentEnrolment,
        DiagnosticTest::InactiveEnrolment,
        DiagnosticTest::GroupMode,
        DiagnosticTest::SelfEnrolmentKeyNotSet,
        DiagnosticTest::SelfEnrolmentKey,
        DiagnosticTest::AutoEnrolmentActionAfterPeriod,
        DiagnosticTest::AutoEnrolmentStudentDataDeletion,
        DiagnosticTest::ExistingEnrolments,
        DiagnosticTest::EnrolmentPluginsEnabled,
        DiagnosticTest::ActivityCompletion,
        DiagnosticTest::AssignmentDueDate,
        DiagnosticTest::CourseSize,
        DiagnosticTest::CourseVideo,
        DiagnosticTest::CourseAudio,
    ];

    /// The name results are stored under.
    pub fn name(self) -> &'static str {
        match self {
            DiagnosticTest::StartDate => "startdate",
            DiagnosticTest::EndDateNotSet => "enddate_notset",
            DiagnosticTest::EndDate => "enddate",
            DiagnosticTest::Visibility => "visibility",
            DiagnosticTest::StudentEnrolment => "studentenrolment",
            DiagnosticTest::InactiveEnrolment => "inactiveenrolment",
            DiagnosticTest::GroupMode => "groupmode",
            DiagnosticTest::SelfEnrolmentKeyNotSet => "selfenrolmentkey_notset",
            DiagnosticTest::SelfEnrolmentKey => "selfenrolmentkey",
            DiagnosticTest::AutoEnrolmentActionAfterPeriod => "autoenrolment_action_after_period",
            DiagnosticTest::AutoEnrolmentStudentDataDeletion => "autoenrolment_studentdatadeletion",
            DiagnosticTest::ExistingEnrolments => "existingenrolments",
            DiagnosticTest::EnrolmentPluginsEnabled => "enrolmentpluginsenabled",
            DiagnosticTest::ActivityCompletion => "activitycompletion",
            DiagnosticTest::AssignmentDueDate => "assignmentduedate",
            DiagnosticTest::CourseSize => "coursesize",
            DiagnosticTest::CourseVideo => "coursevideo",
            DiagnosticTest::CourseAudio => "courseaudio",
        }
    }

    /// Gates guard the test that follows them; when a gate fails the dependent is skipped.
    pub fn is_gate(self) -> bool {
        self.name().ends_with("_notset")
    }

    fn check(self) -> fn(&CheckContext) -> CheckResult {
        match self {
            DiagnosticTest::StartDate => checks::start_date,
            DiagnosticTest::EndDateNotSet => checks::end_date_not_set,
            DiagnosticTest::EndDate => checks::end_date,
            DiagnosticTest::Visibility => checks::visibility,
            DiagnosticTest::StudentEnrolment => checks::student_enrolment,
            DiagnosticTest::InactiveEnrolment => checks::inactive_enrolment,
            DiagnosticTest::GroupMode => checks::group_mode,
            DiagnosticTest::SelfEnrolmentKeyNotSet => checks::self_enrolment_key_not_set,
            DiagnosticTest::SelfEnrolmentKey => checks::self_enrolment_key,
            DiagnosticTest::AutoEnrolmentActionAfterPeriod => {
                checks::auto_enrolment_action_after_period
            }
            DiagnosticTest::AutoEnrolmentStudentDataDeletion => {
                checks::auto_enrolment_student_data_deletion
            }
            DiagnosticTest::ExistingEnrolments => checks::existing_enrolments,
            DiagnosticTest::EnrolmentPluginsEnabled => checks::enrolment_plugins_enabled,
            DiagnosticTest::ActivityCompletion => checks::activity_completion,
            DiagnosticTest::AssignmentDueDate => checks::assignment_due_date,
            DiagnosticTest::CourseSize => checks::course_size,
            DiagnosticTest::CourseVideo => checks::course_video,
            DiagnosticTest::CourseAudio => checks::course_audio,
        }
    }

    /// Runs the test and names its outcome.
    pub fn run(self, ctx: &CheckContext) -> Result<DiagnosticResult, DiagnosticError> {
        let outcome = (self.check())(ctx)?;
        trace!(
            course_id = ctx.course.id,
            test = self.name(),
            passed = outcome.passed,
            "Diagnostic test finished"
        );
        Ok(DiagnosticResult {
            name: self.name().to_string(),
            passed: outcome.passed,
            detail: outcome.detail,
        })
    }
}

impl fmt::Display for DiagnosticTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DiagnosticTest {
    type Err = DiagnosticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == s)
            .ok_or_else(|| DiagnosticError::UnknownTest {
                name: s.to_string(),
            })
    }
}

/// Looks up a test by its configured name and runs it.
pub fn run_named(name: &str, ctx: &CheckContext) -> Result<DiagnosticResult, DiagnosticError> {
    name.parse::<DiagnosticTest>()?.run(ctx)
}

/// An ordered list of tests selected by the settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestSuite {
    tests: Vec<DiagnosticTest>,
}

impl TestSuite {
    /// Expands the enabled toggles into their tests, gates first.
    pub fn from_settings(settings: &DiagnosticSettings) -> Self {
        let tests = settings
            .checks
            .iter()
            .flat_map(|check| check.tests().iter().copied())
            .collect();
        Self { tests }
    }

    /// Builds a suite from raw test names.
    pub fn from_names<I, S>(names: I) -> Result<Self, DiagnosticError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tests = names
            .into_iter()
            .map(|name| name.as_ref().parse())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tests })
    }

    pub fn tests(&self) -> &[DiagnosticTest] {
        &self.tests
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Runs every test in order.
    ///
    /// A failing gate is recorded, and the test right after it is skipped and
    /// left out of the results entirely.
    pub fn run(&self, ctx: &CheckContext) -> Result<Vec<DiagnosticResult>, DiagnosticError> {
        let mut results = Vec::with_capacity(self.tests.len());
        let mut skip_next = false;

        for test in &self.tests {
            if skip_next {
                skip_next = false;
                debug!(
                    course_id = ctx.course.id,
                    test = test.name(),
                    "Skipping dependent test after failed gate"
                );
                continue;
            }

            let result = test.run(ctx)?;
            if test.is_gate() && !result.passed {
                skip_next = true;
            }
            results.push(result);
        }

        Ok(results)
    }
}
