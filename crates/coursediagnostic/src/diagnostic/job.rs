//! Scheduled pre-computation of course reports.
//!
//! Each run walks a page of visible courses from a persisted cursor,
//! re-evaluates them and refreshes their cache entries until the page is
//! done or the configured time limit is reached.

use super::config::KEY_START_COURSE_INDEX;
use super::error::DiagnosticError;
use super::service::DiagnosticService;
use super::types::Course;
use chrono::Utc;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// Courses fetched per run.
pub const BATCH_PAGE_SIZE: usize = 5000;

/// Outcome of one batch run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Skipped { reason: String },
    Completed(BatchSummary),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub start_cursor: usize,
    /// Page positions consumed, site course included
    pub processed: usize,
    pub evaluated: usize,
    pub failures: usize,
    pub next_cursor: usize,
    pub timed_out: bool,
    pub elapsed_ms: u64,
}

pub fn run_batch(service: &DiagnosticService) -> Result<BatchOutcome, DiagnosticError> {
    run_batch_paged(service, BATCH_PAGE_SIZE)
}

/// Runs one batch over at most `page_size` courses.
pub fn run_batch_paged(
    service: &DiagnosticService,
    page_size: usize,
) -> Result<BatchOutcome, DiagnosticError> {
    let settings = service.settings()?;
    if !settings.enabled {
        info!("Course diagnostics disabled, skipping batch run");
        return Ok(BatchOutcome::Skipped {
            reason: "diagnostics are disabled".to_string(),
        });
    }
    if settings.enabled_count() == 0 {
        info!("No diagnostic tests enabled, skipping batch run");
        return Ok(BatchOutcome::Skipped {
            reason: "no tests are enabled".to_string(),
        });
    }

    let run_id = format!("{:08x}", rand::random::<u32>());
    let start_cursor = read_cursor(service)?;
    let time_limit = settings.time_limit();
    let started = Instant::now();

    let course_ids = service.source().visible_course_ids(start_cursor, page_size)?;
    info!(
        run_id = %run_id,
        start_cursor,
        courses = course_ids.len(),
        "Starting course diagnostic batch"
    );

    let mut processed = 0;
    let mut evaluated = 0;
    let mut failures = 0;

    for &course_id in &course_ids {
        processed += 1;

        if !Course::is_site_course(course_id) {
            match service.refresh(course_id, &settings, Utc::now()) {
                Ok(_) => evaluated += 1,
                Err(e) => {
                    failures += 1;
                    warn!(run_id = %run_id, course_id, "Failed to evaluate course: {}", e);
                }
            }
        }

        if started.elapsed() >= time_limit {
            break;
        }
    }

    let finished_page = processed == course_ids.len();
    let timed_out = !finished_page;
    let next_cursor = if timed_out || course_ids.len() == page_size {
        start_cursor + processed
    } else {
        0
    };
    service
        .store()
        .set_config(KEY_START_COURSE_INDEX, &next_cursor.to_string())?;

    let summary = BatchSummary {
        run_id,
        start_cursor,
        processed,
        evaluated,
        failures,
        next_cursor,
        timed_out,
        elapsed_ms: started.elapsed().as_millis() as u64,
    };
    info!(
        run_id = %summary.run_id,
        processed = summary.processed,
        failures = summary.failures,
        next_cursor = summary.next_cursor,
        elapsed_ms = summary.elapsed_ms,
        "Finished course diagnostic batch"
    );

    Ok(BatchOutcome::Completed(summary))
}

fn read_cursor(service: &DiagnosticService) -> Result<usize, DiagnosticError> {
    let stored = service.store().get_config(KEY_START_COURSE_INDEX)?;
    Ok(match stored.as_deref().map(str::trim) {
        None | Some("") => 0,
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!(value, "Invalid batch cursor, restarting from the first course");
            0
        }),
    })
}
