//! Host events that affect cached course reports.

use super::error::DiagnosticError;
use super::processor::Notification;
use super::service::DiagnosticService;
use super::types::Course;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, info};

// `\core\event\course_updated` -> `course_updated`
static EVENT_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\\?(?:\w+\\)*(\w+)$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CourseEvent {
    CourseViewed,
    CourseUpdated,
    CourseDeleted,
    EnrolmentInstanceCreated,
    EnrolmentInstanceUpdated,
    EnrolmentInstanceDeleted,
    UserEnrolmentCreated,
    UserEnrolmentDeleted,
}

impl CourseEvent {
    pub fn short_name(self) -> &'static str {
        match self {
            CourseEvent::CourseViewed => "course_viewed",
            CourseEvent::CourseUpdated => "course_updated",
            CourseEvent::CourseDeleted => "course_deleted",
            CourseEvent::EnrolmentInstanceCreated => "enrol_instance_created",
            CourseEvent::EnrolmentInstanceUpdated => "enrol_instance_updated",
            CourseEvent::EnrolmentInstanceDeleted => "enrol_instance_deleted",
            CourseEvent::UserEnrolmentCreated => "user_enrolment_created",
            CourseEvent::UserEnrolmentDeleted => "user_enrolment_deleted",
        }
    }

    /// Parses a fully qualified or short event name. Unknown events yield `None`.
    pub fn from_event_name(name: &str) -> Option<Self> {
        let short = EVENT_NAME_REGEX
            .captures(name.trim())
            .and_then(|caps| caps.get(1))?
            .as_str();

        [
            CourseEvent::CourseViewed,
            CourseEvent::CourseUpdated,
            CourseEvent::CourseDeleted,
            CourseEvent::EnrolmentInstanceCreated,
            CourseEvent::EnrolmentInstanceUpdated,
            CourseEvent::EnrolmentInstanceDeleted,
            CourseEvent::UserEnrolmentCreated,
            CourseEvent::UserEnrolmentDeleted,
        ]
        .into_iter()
        .find(|e| e.short_name() == short)
    }
}

/// An event as the host delivers it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventPayload {
    pub eventname: String,
    pub courseid: i64,
}

/// What handling an event did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// A course view, answered with the banner to show (if any)
    Viewed { notification: Option<Notification> },
    Invalidated { removed: bool },
    Ignored,
}

impl DiagnosticService {
    /// Handles an event in the host's wire form.
    pub fn handle_payload(
        &self,
        payload: &EventPayload,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome, DiagnosticError> {
        match CourseEvent::from_event_name(&payload.eventname) {
            Some(event) => self.handle_event(event, payload.courseid, now),
            None => {
                debug!(eventname = %payload.eventname, "Ignoring unrecognised event");
                Ok(EventOutcome::Ignored)
            }
        }
    }

    pub fn handle_event(
        &self,
        event: CourseEvent,
        course_id: i64,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome, DiagnosticError> {
        if event == CourseEvent::CourseViewed {
            let notification = self.course_viewed(course_id, now)?;
            return Ok(EventOutcome::Viewed { notification });
        }

        if Course::is_site_course(course_id) || !self.invalidates(event, course_id)? {
            return Ok(EventOutcome::Ignored);
        }

        let removed = self.cache().invalidate(course_id);
        info!(
            course_id,
            event = event.short_name(),
            removed,
            "Invalidated cached course report"
        );
        Ok(EventOutcome::Invalidated { removed })
    }

    /// User enrolment events only matter when the course gains its first
    /// student or loses its last one.
    fn invalidates(&self, event: CourseEvent, course_id: i64) -> Result<bool, DiagnosticError> {
        let invalidates = match event {
            CourseEvent::CourseViewed => false,
            CourseEvent::UserEnrolmentCreated => {
                self.source().student_enrolments(course_id)?.len() == 1
            }
            CourseEvent::UserEnrolmentDeleted => {
                self.source().student_enrolments(course_id)?.is_empty()
            }
            _ => true,
        };
        Ok(invalidates)
    }
}
