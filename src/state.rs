//! Application state shared by the HTTP server and the CLI.

use std::sync::Arc;

use tracing::info;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::salesforce::bulk_ingest_v2::build_http_client;
use crate::salesforce::WaitOptions;
use crate::source::PostgresConnector;
use crate::storage::{Database, DatabaseTaskStore};
use crate::tasks::runner::{HEARTBEAT_INTERVAL, STALE_AFTER};
use crate::tasks::{HttpIngestClientFactory, IngestClientFactory, RunnerOptions, TaskRunner, WorkerPool};

// ─────────────────────────────────────────────────────────────────────────────
// Application State
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a request handler needs.
pub struct AppState<F: IngestClientFactory = HttpIngestClientFactory> {
    pub config: AppConfig,
    pub runner: TaskRunner<F>,
}

impl<F: IngestClientFactory> AppState<F> {
    pub fn new(config: AppConfig, runner: TaskRunner<F>) -> Self {
        Self { config, runner }
    }
}

impl AppState<HttpIngestClientFactory> {
    /// Opens the task database and wires the production collaborators.
    ///
    /// Interrupted tasks are left alone; the server reconciles them with
    /// [`TaskRunner::recover_interrupted`] and [`TaskRunner::spawn_recovery`].
    pub async fn init(config: AppConfig) -> Result<Self, AppError> {
        let db = Database::init(config.db_path.clone()).await?;
        info!("[TASKS] Task store at {}", config.db_path.display());

        let http = Arc::new(build_http_client()?);
        let runner = TaskRunner::new(
            Arc::new(DatabaseTaskStore::new(db)),
            Arc::new(PostgresConnector::new()),
            HttpIngestClientFactory::new(http),
            WorkerPool::new(config.max_concurrent_uploads),
            runner_options(&config),
        );

        Ok(Self::new(config, runner))
    }
}

/// Runner settings derived from the process configuration.
pub fn runner_options(config: &AppConfig) -> RunnerOptions {
    RunnerOptions {
        wait: WaitOptions {
            poll_interval: config.poll_interval,
            max_wait: config.max_wait,
        },
        naming: config.object_naming,
        heartbeat_interval: HEARTBEAT_INTERVAL,
        stale_after: STALE_AFTER,
    }
}
