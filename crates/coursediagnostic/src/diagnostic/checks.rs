//! The individual course diagnostics.
//!
//! Every check reads what it needs through a [`CheckContext`] and returns a
//! [`CheckOutcome`]. Checks are independent of each other; ordering and
//! gating live in [`super::registry::TestSuite`].

use super::config::DiagnosticSettings;
use super::error::DiagnosticError;
use super::source::CourseDataSource;
use super::types::*;
use chrono::{DateTime, Utc};
use std::cell::OnceCell;
use url::Url;

/// Everything a check may look at for one course evaluation.
pub struct CheckContext<'a> {
    pub course: &'a Course,
    pub source: &'a dyn CourseDataSource,
    pub settings: &'a DiagnosticSettings,
    pub now: DateTime<Utc>,
    enrolment_instances: OnceCell<Vec<EnrolmentInstance>>,
}

impl<'a> CheckContext<'a> {
    pub fn new(
        course: &'a Course,
        source: &'a dyn CourseDataSource,
        settings: &'a DiagnosticSettings,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            course,
            source,
            settings,
            now,
            enrolment_instances: OnceCell::new(),
        }
    }

    /// Enrolment instances of the course, loaded once per evaluation.
    pub fn enrolment_instances(&self) -> Result<&[EnrolmentInstance], DiagnosticError> {
        if let Some(instances) = self.enrolment_instances.get() {
            return Ok(instances);
        }
        let loaded = self.source.enrolment_instances(self.course.id)?;
        Ok(self.enrolment_instances.get_or_init(|| loaded))
    }

    /// Enabled instances of the configured automatic enrolment method.
    fn automatic_instances(&self) -> Result<Vec<&EnrolmentInstance>, DiagnosticError> {
        let method = &self.settings.auto_enrolment_method;
        Ok(self
            .enrolment_instances()?
            .iter()
            .filter(|i| i.enabled && &i.method == method)
            .collect())
    }

    /// Builds a link to a site page, absolute when a site url is configured.
    fn link(&self, label: &str, path: &str, query: &[(&str, String)]) -> ReportLink {
        let url = match self.settings.site_url.as_deref().map(Url::parse) {
            Some(Ok(base)) => match base.join(path) {
                Ok(mut url) => {
                    url.query_pairs_mut()
                        .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
                    url.to_string()
                }
                Err(_) => relative_link(path, query),
            },
            _ => relative_link(path, query),
        };

        ReportLink {
            label: label.to_string(),
            url,
        }
    }
}

fn relative_link(path: &str, query: &[(&str, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    serializer.extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    format!("{}?{}", path, serializer.finish())
}

/// Result of a single check before it is named by the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub detail: Option<DiagnosticDetail>,
}

impl CheckOutcome {
    pub fn pass() -> Self {
        Self::from_bool(true)
    }

    pub fn from_bool(passed: bool) -> Self {
        Self {
            passed,
            detail: None,
        }
    }

    pub fn with_detail(passed: bool, detail: DiagnosticDetail) -> Self {
        Self {
            passed,
            detail: Some(detail),
        }
    }
}

pub type CheckResult = Result<CheckOutcome, DiagnosticError>;

/// Fails if the course has not started yet.
pub fn start_date(ctx: &CheckContext) -> CheckResult {
    Ok(CheckOutcome::from_bool(ctx.course.start_date <= ctx.now))
}

/// Gate: fails if the course has no end date.
pub fn end_date_not_set(ctx: &CheckContext) -> CheckResult {
    Ok(CheckOutcome::from_bool(ctx.course.end_date.is_some()))
}

/// Fails if the end date is missing or already in the past.
pub fn end_date(ctx: &CheckContext) -> CheckResult {
    let passed = ctx.course.end_date.is_some_and(|end| end >= ctx.now);
    Ok(CheckOutcome::from_bool(passed))
}

pub fn visibility(ctx: &CheckContext) -> CheckResult {
    Ok(CheckOutcome::from_bool(ctx.course.visible))
}

/// Fails if nobody holds the student role on the course.
pub fn student_enrolment(ctx: &CheckContext) -> CheckResult {
    let students = ctx.source.student_enrolments(ctx.course.id)?;
    Ok(CheckOutcome::from_bool(!students.is_empty()))
}

/// Fails if any student enrolment is suspended or has expired.
pub fn inactive_enrolment(ctx: &CheckContext) -> CheckResult {
    let students = ctx.source.student_enrolments(ctx.course.id)?;
    let all_active = students.iter().all(|e| e.is_active_at(ctx.now));
    Ok(CheckOutcome::from_bool(all_active))
}

/// With groups switched on, at least one group must exist and have a member.
pub fn group_mode(ctx: &CheckContext) -> CheckResult {
    if ctx.course.group_mode == GroupMode::NoGroups {
        return Ok(CheckOutcome::pass());
    }

    let groups = ctx.source.groups(ctx.course.id)?;
    Ok(CheckOutcome::from_bool(
        groups.iter().any(|g| g.member_count > 0),
    ))
}

/// Gate: fails unless an enabled self-enrolment instance exists.
pub fn self_enrolment_key_not_set(ctx: &CheckContext) -> CheckResult {
    let uses_self_enrolment = ctx
        .enrolment_instances()?
        .iter()
        .any(|i| i.enabled && i.method == "self");
    Ok(CheckOutcome::from_bool(uses_self_enrolment))
}

/// Fails if any enabled self-enrolment instance has no enrolment key.
pub fn self_enrolment_key(ctx: &CheckContext) -> CheckResult {
    let all_keyed = ctx
        .enrolment_instances()?
        .iter()
        .filter(|i| i.enabled && i.method == "self")
        .all(|i| i.has_key);
    Ok(CheckOutcome::from_bool(all_keyed))
}

/// Fails if an automatic enrolment with an end date unenrols students once it passes.
pub fn auto_enrolment_action_after_period(ctx: &CheckContext) -> CheckResult {
    let unenrols = ctx
        .automatic_instances()?
        .into_iter()
        .any(|i| i.enrol_end_date.is_some() && i.unenrol_on_expiry);
    Ok(CheckOutcome::from_bool(!unenrols))
}

/// Fails if a time-limited automatic enrolment removes students or their group
/// memberships when they leave the class list. Offending instances are linked.
pub fn auto_enrolment_student_data_deletion(ctx: &CheckContext) -> CheckResult {
    let links: Vec<ReportLink> = ctx
        .automatic_instances()?
        .into_iter()
        .filter(|i| i.has_time_limit() && (i.unenrol_on_removal || i.remove_from_groups))
        .map(|i| {
            ctx.link(
                i.display_name(),
                "/enrol/editinstance.php",
                &[
                    ("id", i.id.to_string()),
                    ("courseid", i.course_id.to_string()),
                    ("type", i.method.clone()),
                ],
            )
        })
        .collect();

    Ok(CheckOutcome::with_detail(
        links.is_empty(),
        DiagnosticDetail::links(links),
    ))
}

/// Fails unless an enabled instance of the automatic enrolment method exists.
pub fn existing_enrolments(ctx: &CheckContext) -> CheckResult {
    let has_automatic = !ctx.automatic_instances()?.is_empty();
    Ok(CheckOutcome::from_bool(has_automatic))
}

/// Fails if every enrolment method on the course is disabled.
pub fn enrolment_plugins_enabled(ctx: &CheckContext) -> CheckResult {
    let any_enabled = ctx.enrolment_instances()?.iter().any(|i| i.enabled);
    Ok(CheckOutcome::from_bool(any_enabled))
}

/// With course completion off, activity completion tracking has no effect.
pub fn activity_completion(ctx: &CheckContext) -> CheckResult {
    if ctx.course.completion_enabled {
        return Ok(CheckOutcome::pass());
    }

    let modules = ctx.source.modules(ctx.course.id)?;
    Ok(CheckOutcome::from_bool(
        !modules.iter().any(|m| m.completion_tracking),
    ))
}

/// Fails if any assignment lacks a due date; each one is linked to its edit page.
pub fn assignment_due_date(ctx: &CheckContext) -> CheckResult {
    let links: Vec<ReportLink> = ctx
        .source
        .modules(ctx.course.id)?
        .iter()
        .filter(|m| m.is_assignment() && m.due_date.is_none())
        .map(|m| {
            ctx.link(
                &m.name,
                "/course/modedit.php",
                &[("update", m.id.to_string()), ("return", "1".to_string())],
            )
        })
        .collect();

    Ok(CheckOutcome::with_detail(
        links.is_empty(),
        DiagnosticDetail::links(links),
    ))
}

fn usage_within_limit(ctx: &CheckContext, filter: MimeFilter) -> Result<(bool, FileUsage), DiagnosticError> {
    let usage = ctx.source.file_usage(ctx.course.id, filter)?;
    let limit = ctx.settings.file_size_limit.bytes();
    Ok((usage.total_bytes < limit, usage))
}

pub fn course_size(ctx: &CheckContext) -> CheckResult {
    let (within, _) = usage_within_limit(ctx, MimeFilter::All)?;
    Ok(CheckOutcome::from_bool(within))
}

pub fn course_video(ctx: &CheckContext) -> CheckResult {
    let (within, _) = usage_within_limit(ctx, MimeFilter::Video)?;
    Ok(CheckOutcome::from_bool(within))
}

/// Like [`course_video`], but reports the totals when the limit is reached.
pub fn course_audio(ctx: &CheckContext) -> CheckResult {
    let (within, usage) = usage_within_limit(ctx, MimeFilter::Audio)?;
    let (total_files, total_bytes) = if within {
        (0, 0)
    } else {
        (usage.file_count, usage.total_bytes)
    };

    Ok(CheckOutcome::with_detail(
        within,
        DiagnosticDetail::FileSize {
            total_files,
            total_size: format_size(total_bytes),
            size_limit: format_size(ctx.settings.file_size_limit.bytes()),
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CourseDbManager, CourseSnapshot, EnrolmentRecord, FileRecord, ModuleRecord};
    use crate::diagnostic::config::FileSizeLimit;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn ts(year: i32, month: u32, day: u32) -> i64 {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0)
            .unwrap()
            .timestamp()
    }

    fn db_with(snapshot: CourseSnapshot) -> CourseDbManager {
        let db = CourseDbManager::open_in_memory().unwrap();
        db.import_snapshot(&snapshot).unwrap();
        db
    }

    fn evaluate(
        db: &CourseDbManager,
        settings: &DiagnosticSettings,
        check: fn(&CheckContext) -> CheckResult,
    ) -> CheckOutcome {
        let course = db.course(2).unwrap();
        let ctx = CheckContext::new(&course, db, settings, now());
        check(&ctx).unwrap()
    }

    fn run(db: &CourseDbManager, check: fn(&CheckContext) -> CheckResult) -> CheckOutcome {
        evaluate(db, &DiagnosticSettings::default(), check)
    }

    #[test]
    fn test_dates() {
        let future = db_with(CourseSnapshot::single_course(2, |c| {
            c.startdate = ts(2024, 9, 1);
        }));
        assert!(!run(&future, start_date).passed);
        assert!(!run(&future, end_date_not_set).passed);
        assert!(!run(&future, end_date).passed);

        let running = db_with(CourseSnapshot::single_course(2, |c| {
            c.startdate = ts(2024, 1, 1);
            c.enddate = ts(2024, 6, 1);
        }));
        assert!(run(&running, start_date).passed);
        assert!(run(&running, end_date_not_set).passed);
        assert!(run(&running, end_date).passed);

        let finished = db_with(CourseSnapshot::single_course(2, |c| {
            c.enddate = ts(2023, 6, 1);
        }));
        assert!(run(&finished, end_date_not_set).passed);
        assert!(!run(&finished, end_date).passed);
    }

    #[test]
    fn test_student_enrolments() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        assert!(!run(&db_with(snapshot.clone()), student_enrolment).passed);
        assert!(run(&db_with(snapshot.clone()), inactive_enrolment).passed);

        snapshot.enrolments.push(EnrolmentRecord::new(10, 2, "manual"));
        snapshot.add_student(10, 100, |_| {});
        snapshot.add_student(10, 101, |ue| ue.timeend = ts(2024, 1, 1));
        let db = db_with(snapshot);
        assert!(run(&db, student_enrolment).passed);
        assert!(!run(&db, inactive_enrolment).passed);
    }

    #[test]
    fn test_group_mode() {
        let no_groups = db_with(CourseSnapshot::single_course(2, |_| {}));
        assert!(run(&no_groups, group_mode).passed);

        let mut snapshot = CourseSnapshot::single_course(2, |c| c.groupmode = 1);
        assert!(!run(&db_with(snapshot.clone()), group_mode).passed);

        snapshot.add_group(20, 2, "Lab A", &[]);
        assert!(!run(&db_with(snapshot.clone()), group_mode).passed);

        snapshot.add_group(21, 2, "Lab B", &[100]);
        assert!(run(&db_with(snapshot), group_mode).passed);
    }

    #[test]
    fn test_self_enrolment_key() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        let mut disabled = EnrolmentRecord::new(10, 2, "self");
        disabled.status = 1;
        snapshot.enrolments.push(disabled);
        let db = db_with(snapshot.clone());
        assert!(!run(&db, self_enrolment_key_not_set).passed);
        assert!(run(&db, self_enrolment_key).passed);

        snapshot.enrolments.push(EnrolmentRecord::new(11, 2, "self"));
        let db = db_with(snapshot.clone());
        assert!(run(&db, self_enrolment_key_not_set).passed);
        assert!(!run(&db, self_enrolment_key).passed);

        snapshot.enrolments[1].password = Some("letmein".to_string());
        assert!(run(&db_with(snapshot), self_enrolment_key).passed);
    }

    #[test]
    fn test_auto_enrolment_checks() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        snapshot.enrolments.push(EnrolmentRecord::new(10, 2, "manual"));
        let db = db_with(snapshot.clone());
        assert!(!run(&db, existing_enrolments).passed);
        assert!(run(&db, auto_enrolment_action_after_period).passed);
        assert!(run(&db, auto_enrolment_student_data_deletion).passed);

        let mut auto = EnrolmentRecord::new(11, 2, "gudatabase");
        auto.name = Some("MyCampus".to_string());
        auto.enrolenddate = ts(2024, 7, 1);
        auto.expireroleid = 0;
        auto.customint4 = 1;
        snapshot.enrolments.push(auto);
        let db = db_with(snapshot);

        assert!(run(&db, existing_enrolments).passed);
        assert!(!run(&db, auto_enrolment_action_after_period).passed);

        let outcome = run(&db, auto_enrolment_student_data_deletion);
        assert!(!outcome.passed);
        match outcome.detail {
            Some(DiagnosticDetail::Links { links, plural }) => {
                assert!(!plural);
                assert_eq!(links[0].label, "MyCampus");
                assert_eq!(
                    links[0].url,
                    "/enrol/editinstance.php?id=11&courseid=2&type=gudatabase"
                );
            }
            other => panic!("unexpected detail: {:?}", other),
        }
    }

    #[test]
    fn test_auto_enrolment_method_is_configurable() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        snapshot.enrolments.push(EnrolmentRecord::new(10, 2, "database"));
        let db = db_with(snapshot);

        assert!(!run(&db, existing_enrolments).passed);

        let settings = DiagnosticSettings {
            auto_enrolment_method: "database".to_string(),
            ..DiagnosticSettings::default()
        };
        assert!(evaluate(&db, &settings, existing_enrolments).passed);
    }

    #[test]
    fn test_enrolment_plugins_enabled() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        let mut manual = EnrolmentRecord::new(10, 2, "manual");
        manual.status = 1;
        snapshot.enrolments.push(manual);
        assert!(!run(&db_with(snapshot.clone()), enrolment_plugins_enabled).passed);

        snapshot.enrolments[0].status = 0;
        assert!(run(&db_with(snapshot), enrolment_plugins_enabled).passed);
    }

    #[test]
    fn test_activity_completion() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        let mut forum = ModuleRecord::new(30, 2, "forum", "News");
        forum.completion = 2;
        snapshot.modules.push(forum);
        assert!(!run(&db_with(snapshot.clone()), activity_completion).passed);

        snapshot.courses[0].enablecompletion = 1;
        assert!(run(&db_with(snapshot), activity_completion).passed);
    }

    #[test]
    fn test_assignment_due_dates_are_linked() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        let mut dated = ModuleRecord::new(30, 2, "assign", "Essay 1");
        dated.duedate = ts(2024, 4, 1);
        snapshot.modules.push(dated);
        snapshot.modules.push(ModuleRecord::new(31, 2, "assign", "Essay 2"));
        snapshot.modules.push(ModuleRecord::new(32, 2, "assign", "Essay 3"));
        snapshot.modules.push(ModuleRecord::new(33, 2, "quiz", "Quiz"));
        let db = db_with(snapshot);

        let settings = DiagnosticSettings {
            site_url: Some("https://moodle.example.ac.uk".to_string()),
            ..DiagnosticSettings::default()
        };
        let outcome = evaluate(&db, &settings, assignment_due_date);
        assert!(!outcome.passed);
        match outcome.detail {
            Some(DiagnosticDetail::Links { links, plural }) => {
                assert!(plural);
                let labels: Vec<_> = links.iter().map(|l| l.label.as_str()).collect();
                assert_eq!(labels, vec!["Essay 2", "Essay 3"]);
                assert_eq!(
                    links[0].url,
                    "https://moodle.example.ac.uk/course/modedit.php?update=31&return=1"
                );
            }
            other => panic!("unexpected detail: {:?}", other),
        }
    }

    #[test]
    fn test_file_size_limits() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        snapshot.files.push(FileRecord::new(2, "lecture.mp4", 60 << 20, "video/mp4"));
        snapshot.files.push(FileRecord::new(2, "lecture2.mp4", 40 << 20, "video/mp4"));
        snapshot.files.push(FileRecord::new(2, "intro.mp3", 10 << 20, "audio/mp3"));
        snapshot.files.push(FileRecord::new(2, ".", 0, ""));
        let db = db_with(snapshot);

        let small = DiagnosticSettings {
            file_size_limit: FileSizeLimit::Mb100,
            ..DiagnosticSettings::default()
        };
        // Exactly at the limit fails.
        assert!(!evaluate(&db, &small, course_video).passed);
        assert!(!evaluate(&db, &small, course_size).passed);
        assert!(evaluate(&db, &small, course_audio).passed);

        let large = DiagnosticSettings {
            file_size_limit: FileSizeLimit::Mb500,
            ..DiagnosticSettings::default()
        };
        assert!(evaluate(&db, &large, course_video).passed);
        assert!(evaluate(&db, &large, course_size).passed);
    }

    #[test]
    fn test_course_audio_reports_totals() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        snapshot.files.push(FileRecord::new(2, "a.wav", 80 << 20, "audio/wav"));
        snapshot.files.push(FileRecord::new(2, "b.ogg", 48 << 20, "audio/ogg"));
        let db = db_with(snapshot);

        let settings = DiagnosticSettings {
            file_size_limit: FileSizeLimit::Mb100,
            ..DiagnosticSettings::default()
        };
        let outcome = evaluate(&db, &settings, course_audio);
        assert!(!outcome.passed);
        assert_eq!(
            outcome.detail,
            Some(DiagnosticDetail::FileSize {
                total_files: 2,
                total_size: "128 MB".to_string(),
                size_limit: "100 MB".to_string(),
            })
        );
    }

    #[test]
    fn test_enrolment_instances_are_loaded_once() {
        let mut snapshot = CourseSnapshot::single_course(2, |_| {});
        snapshot.enrolments.push(EnrolmentRecord::new(10, 2, "self"));
        let db = db_with(snapshot);
        let course = db.course(2).unwrap();
        let settings = DiagnosticSettings::default();
        let ctx = CheckContext::new(&course, &db, &settings, now());

        let first = ctx.enrolment_instances().unwrap().as_ptr();
        let second = ctx.enrolment_instances().unwrap().as_ptr();
        assert_eq!(first, second);
    }
}
