//! Ties the data source, the settings snapshot and the report cache together.

use super::cache::ReportCache;
use super::checks::CheckContext;
use super::config::{DiagnosticSettings, SuiteSelection};
use super::error::DiagnosticError;
use super::processor::{self, Notification};
use super::registry::TestSuite;
use super::report::CourseReportView;
use super::source::{CourseDataSource, SettingsStore};
use super::types::{CachedCourseReport, Course};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

pub struct DiagnosticService {
    source: Arc<dyn CourseDataSource>,
    store: Arc<dyn SettingsStore>,
    cache: ReportCache,
    selection: SuiteSelection,
}

impl DiagnosticService {
    pub fn new(source: Arc<dyn CourseDataSource>, store: Arc<dyn SettingsStore>) -> Self {
        Self {
            source,
            store,
            cache: ReportCache::new(),
            selection: SuiteSelection::new(),
        }
    }

    pub fn cache(&self) -> &ReportCache {
        &self.cache
    }

    pub fn source(&self) -> &dyn CourseDataSource {
        self.source.as_ref()
    }

    pub fn store(&self) -> &dyn SettingsStore {
        self.store.as_ref()
    }

    /// Current settings snapshot.
    pub fn settings(&self) -> Result<Arc<DiagnosticSettings>, DiagnosticError> {
        self.selection.current(self.store.as_ref())
    }

    /// Persists new settings and drops the snapshot so the next run picks them up.
    pub fn save_settings(
        &self,
        settings: DiagnosticSettings,
    ) -> Result<Arc<DiagnosticSettings>, DiagnosticError> {
        settings.normalise().save(self.store.as_ref())?;
        self.selection.invalidate();
        self.settings()
    }

    /// Runs the configured suite against a course without touching the cache.
    pub fn evaluate(
        &self,
        course_id: i64,
        settings: &DiagnosticSettings,
        now: DateTime<Utc>,
    ) -> Result<CachedCourseReport, DiagnosticError> {
        let course = self.source.course(course_id)?;
        let ctx = CheckContext::new(&course, self.source.as_ref(), settings, now);
        let results = TestSuite::from_settings(settings).run(&ctx)?;

        debug!(
            course_id,
            total = results.len(),
            passed = results.iter().filter(|r| r.passed).count(),
            "Evaluated course diagnostics"
        );

        Ok(CachedCourseReport {
            course_id,
            results,
            generated_at: now,
        })
    }

    /// Evaluates a course and replaces its cache entry.
    pub fn refresh(
        &self,
        course_id: i64,
        settings: &DiagnosticSettings,
        now: DateTime<Utc>,
    ) -> Result<CachedCourseReport, DiagnosticError> {
        let report = self.evaluate(course_id, settings, now)?;
        self.cache.insert(report.clone());
        Ok(report)
    }

    /// Cached report for a course, computing and caching it on a miss.
    fn cached_or_refresh(
        &self,
        course_id: i64,
        settings: &DiagnosticSettings,
        now: DateTime<Utc>,
    ) -> Result<CachedCourseReport, DiagnosticError> {
        match self.cache.get(course_id) {
            Some(report) => Ok(report),
            None => self.refresh(course_id, settings, now),
        }
    }

    /// Course page view: returns the banner to show, if any.
    pub fn course_viewed(
        &self,
        course_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<Notification>, DiagnosticError> {
        if Course::is_site_course(course_id) {
            return Ok(None);
        }

        let settings = self.settings()?;
        if !settings.enabled || settings.enabled_count() == 0 {
            return Ok(None);
        }

        let report = self.cached_or_refresh(course_id, &settings, now)?;
        let notification = processor::notification(course_id, &report.results);
        if let Some(n) = &notification {
            info!(
                course_id,
                failed_percentage = n.failed_percentage,
                severity = ?n.severity,
                "Course has failing diagnostics"
            );
        }
        Ok(notification)
    }

    /// Data for the course report page.
    pub fn report(
        &self,
        course_id: i64,
        now: DateTime<Utc>,
    ) -> Result<CourseReportView, DiagnosticError> {
        if Course::is_site_course(course_id) {
            return Err(DiagnosticError::CourseNotFound { course_id });
        }

        let settings = self.settings()?;
        if !settings.enabled {
            return Err(DiagnosticError::Disabled);
        }

        let report = self.cached_or_refresh(course_id, &settings, now)?;
        Ok(CourseReportView::new(&settings, &report))
    }
}
