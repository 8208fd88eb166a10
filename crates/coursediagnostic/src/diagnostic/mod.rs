//! Course diagnostics: the checks, their settings, result caching and the
//! flows that drive them (course views, host events, the batch run).

mod cache;
mod checks;
mod config;
mod error;
mod job;
mod observer;
mod processor;
mod registry;
mod report;
mod service;
mod source;
mod types;

pub use cache::{CacheKey, CacheStats, ReportCache};
pub use checks::{CheckContext, CheckOutcome, CheckResult};
pub use config::*;
pub use error::DiagnosticError;
pub use job::{run_batch, run_batch_paged, BatchOutcome, BatchSummary, BATCH_PAGE_SIZE};
pub use observer::{CourseEvent, EventOutcome, EventPayload};
pub use processor::{failed_percentage, notification, Notification, Severity, REPORT_PATH};
pub use registry::{run_named, DiagnosticTest, TestSuite};
pub use report::{build_rows, CourseReportView, ReportRow, RowStatus};
pub use service::DiagnosticService;
pub use source::{CourseDataSource, SettingsStore};
pub use types::*;
