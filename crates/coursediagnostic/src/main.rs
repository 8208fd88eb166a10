use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use coursediagnostic::config::ServiceConfig;
use coursediagnostic::db::{CourseDbManager, CourseSnapshot};
use coursediagnostic::diagnostic::{BatchOutcome, DiagnosticService};
use coursediagnostic::server::create_router;
use coursediagnostic::types::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = ServiceConfig::load(config_path.as_deref())
        .context("failed to load service configuration")?;

    let db = Arc::new(
        CourseDbManager::open(&config.database_path)
            .with_context(|| format!("failed to open database {}", config.database_path))?,
    );

    if let Some(path) = &config.import_path {
        let snapshot = CourseSnapshot::from_file(path)
            .with_context(|| format!("failed to read course snapshot {}", path))?;
        db.import_snapshot(&snapshot)?;
    }

    let service = DiagnosticService::new(db.clone(), db);
    let state = AppState::new(service, config.clone());

    match config.batch_interval() {
        Some(period) => {
            tokio::spawn(run_batch_schedule(state.clone(), period));
        }
        None => info!("Scheduled batch runs disabled"),
    }

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!("Listening on {}", address);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Runs the batch driver every `period`. Ticks that find a run in progress are skipped.
async fn run_batch_schedule(state: Arc<AppState>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        match state.run_batch().await {
            Ok(Ok(BatchOutcome::Completed(summary))) => info!(
                run_id = %summary.run_id,
                evaluated = summary.evaluated,
                "Scheduled batch run complete"
            ),
            Ok(Ok(BatchOutcome::Skipped { reason })) => info!("Scheduled batch run skipped: {}", reason),
            Ok(Err(e)) => error!("Scheduled batch run failed: {}", e),
            Err(e) => error!("Scheduled batch task panicked: {}", e),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down");
}
