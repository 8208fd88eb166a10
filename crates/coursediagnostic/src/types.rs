use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinError;

use crate::config::ServiceConfig;
use crate::diagnostic::{run_batch, BatchOutcome, DiagnosticError, DiagnosticService};

/// State shared by the HTTP handlers and the batch loop.
pub struct AppState {
    pub service: DiagnosticService,
    pub config: ServiceConfig,
    pub started_at: DateTime<Utc>,
    /// Held for the duration of a batch run
    pub(crate) batch_lock: Mutex<()>,
}

impl AppState {
    pub fn new(service: DiagnosticService, config: ServiceConfig) -> Arc<Self> {
        Arc::new(Self {
            service,
            config,
            started_at: Utc::now(),
            batch_lock: Mutex::new(()),
        })
    }

    /// Runs one batch on a blocking thread. Skips if another run holds the lock.
    pub async fn run_batch(
        self: &Arc<Self>,
    ) -> Result<Result<BatchOutcome, DiagnosticError>, JoinError> {
        let Ok(_guard) = self.batch_lock.try_lock() else {
            return Ok(Ok(BatchOutcome::Skipped {
                reason: "a batch run is already in progress".to_string(),
            }));
        };

        let state = self.clone();
        tokio::task::spawn_blocking(move || run_batch(&state.service)).await
    }
}
