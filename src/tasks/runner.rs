//! Background execution of upload tasks.
//!
//! [`TaskRunner::submit`] records a `PENDING` task and returns its id right
//! away; the upload itself runs on the tokio runtime, bounded by the
//! [`WorkerPool`], and its outcome lands in the [`TaskStore`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::salesforce::bulk_ingest_v2::redact_id;
use crate::salesforce::{
    BulkIngestV2Client, BulkUploadAdapter, IngestClientOps, ObjectNaming, SessionContext, WaitOptions,
};
use crate::source::{SourceConnector, TableRef};
use crate::storage::{TaskStore, UploadTask};
use crate::tasks::orchestrator::{resolve_object, UploadOrchestrator, UploadRequest};
use crate::tasks::scheduler::WorkerPool;

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation Token Storage
// ─────────────────────────────────────────────────────────────────────────────

/// Cancellation tokens of tasks that have not finished yet, keyed by task id.
pub struct CancellationTokens {
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

impl CancellationTokens {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, task_id: String, token: CancellationToken) {
        let mut guard = self.tokens.lock().await;
        guard.insert(task_id, token);
    }

    pub async fn get(&self, task_id: &str) -> Option<CancellationToken> {
        let guard = self.tokens.lock().await;
        guard.get(task_id).cloned()
    }

    pub async fn remove(&self, task_id: &str) {
        let mut guard = self.tokens.lock().await;
        guard.remove(task_id);
    }
}

impl Default for CancellationTokens {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ingest Client Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the ingest client for a caller's Salesforce session.
pub trait IngestClientFactory: Send + Sync + 'static {
    type Client: IngestClientOps + 'static;

    fn client_for(&self, session: &SessionContext) -> Self::Client;
}

/// Production factory sharing one HTTP connection pool.
#[derive(Clone)]
pub struct HttpIngestClientFactory {
    http: Arc<Client>,
}

impl HttpIngestClientFactory {
    pub fn new(http: Arc<Client>) -> Self {
        Self { http }
    }
}

impl IngestClientFactory for HttpIngestClientFactory {
    type Client = BulkIngestV2Client;

    fn client_for(&self, session: &SessionContext) -> Self::Client {
        session.ingest_client(self.http.clone())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TaskRunner
// ─────────────────────────────────────────────────────────────────────────────

/// How often an open task refreshes its heartbeat.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Open tasks whose heartbeat is older than this belong to a dead process.
pub const STALE_AFTER: Duration = Duration::from_secs(120);

/// Settings shared by every task a runner starts.
#[derive(Debug, Clone, Copy)]
pub struct RunnerOptions {
    pub wait: WaitOptions,
    pub naming: ObjectNaming,
    pub heartbeat_interval: Duration,
    pub stale_after: Duration,
}

/// Submits, cancels and tracks upload tasks.
pub struct TaskRunner<F: IngestClientFactory> {
    store: Arc<dyn TaskStore>,
    connector: Arc<dyn SourceConnector>,
    factory: Arc<F>,
    pool: WorkerPool,
    tokens: Arc<CancellationTokens>,
    options: RunnerOptions,
}

impl<F: IngestClientFactory> Clone for TaskRunner<F> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            connector: self.connector.clone(),
            factory: self.factory.clone(),
            pool: self.pool.clone(),
            tokens: self.tokens.clone(),
            options: self.options,
        }
    }
}

impl<F: IngestClientFactory> TaskRunner<F> {
    pub fn new(
        store: Arc<dyn TaskStore>,
        connector: Arc<dyn SourceConnector>,
        factory: F,
        pool: WorkerPool,
        options: RunnerOptions,
    ) -> Self {
        Self {
            store,
            connector,
            factory: Arc::new(factory),
            pool,
            tokens: Arc::new(CancellationTokens::new()),
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn connector(&self) -> &Arc<dyn SourceConnector> {
        &self.connector
    }

    /// Marks open tasks whose owning process stopped heartbeating as failed.
    pub async fn recover_interrupted(&self) -> Result<u64, AppError> {
        let count = self.store.fail_interrupted(self.options.stale_after).await?;
        if count > 0 {
            warn!("[TASKS] Marked {} interrupted task(s) as failed", count);
        }
        Ok(count)
    }

    /// Repeats [`Self::recover_interrupted`] every `stale_after` until
    /// `shutdown` fires, so tasks of a process that died shortly before this
    /// one started are reclaimed once their heartbeat expires.
    pub fn spawn_recovery(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(runner.options.stale_after);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = runner.recover_interrupted().await {
                            warn!("[TASKS] Recovery sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// Stores a `PENDING` task for `request` and starts it in the background.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidTableName` - the table name is malformed; no task is stored
    /// - storage errors from `insert_task`
    pub async fn submit(
        &self,
        session: SessionContext,
        request: UploadRequest,
    ) -> Result<String, AppError> {
        let table = TableRef::parse(&request.table)?;
        let object = resolve_object(self.options.naming, &table, request.object.as_deref());
        let task_id = Uuid::new_v4().to_string();

        self.store.insert_task(&task_id, &request.table, &object).await?;

        let cancel = CancellationToken::new();
        self.tokens.insert(task_id.clone(), cancel.clone()).await;

        info!(
            "[TASKS] Queued task {} ({} -> {} on {})",
            redact_id(&task_id),
            table,
            object,
            session.host()
        );

        let runner = self.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            runner.run_task(&id, session, request, cancel).await;
        });

        Ok(task_id)
    }

    async fn run_task(
        &self,
        task_id: &str,
        session: SessionContext,
        request: UploadRequest,
        cancel: CancellationToken,
    ) {
        let execute = self.execute(task_id, &session, &request, &cancel);
        tokio::pin!(execute);
        let mut heartbeat = tokio::time::interval(self.options.heartbeat_interval);
        heartbeat.tick().await;

        let outcome = loop {
            tokio::select! {
                outcome = &mut execute => break outcome,
                _ = heartbeat.tick() => {
                    if let Err(e) = self.store.touch_task(task_id).await {
                        warn!("[TASKS] Heartbeat for task {} failed: {}", redact_id(task_id), e);
                    }
                }
            }
        };
        self.tokens.remove(task_id).await;

        let stored = match &outcome {
            Ok(result) => {
                info!(
                    "[TASKS] Task {} succeeded ({} row(s), {} failed)",
                    redact_id(task_id),
                    result.data_rows().len(),
                    result.failed
                );
                self.store.mark_succeeded(task_id, result).await
            }
            Err(e) => {
                warn!("[TASKS] Task {} failed: {}", redact_id(task_id), e.describe());
                self.store.mark_failed(task_id, &e.describe()).await
            }
        };

        if let Err(e) = stored {
            error!(
                "[TASKS] Could not record outcome of task {}: {}",
                redact_id(task_id),
                e
            );
        }
    }

    async fn execute(
        &self,
        task_id: &str,
        session: &SessionContext,
        request: &UploadRequest,
        cancel: &CancellationToken,
    ) -> Result<crate::salesforce::UploadResult, AppError> {
        let _slot = self.pool.acquire(cancel).await?;
        self.store.mark_running(task_id).await?;

        let adapter = BulkUploadAdapter::new(self.factory.client_for(session), self.options.wait);
        let orchestrator =
            UploadOrchestrator::new(self.connector.clone(), adapter, self.options.naming);

        orchestrator.run(request, cancel).await
    }

    /// Requests cancellation of an unfinished task.
    ///
    /// Returns `false` when the task exists but has already finished.
    ///
    /// # Errors
    ///
    /// `AppError::NotFound` for an unknown task id.
    pub async fn cancel(&self, task_id: &str) -> Result<bool, AppError> {
        if let Some(token) = self.tokens.get(task_id).await {
            token.cancel();
            info!("[TASKS] Cancellation requested for task {}", redact_id(task_id));
            return Ok(true);
        }

        match self.store.get_task(task_id).await? {
            Some(_) => Ok(false),
            None => Err(AppError::NotFound(format!("Upload task {}", task_id))),
        }
    }

    pub async fn get_task(&self, task_id: &str) -> Result<Option<UploadTask>, AppError> {
        self.store.get_task(task_id).await
    }

    /// Polls the store until the task is terminal.
    pub async fn wait_for_task(
        &self,
        task_id: &str,
        poll_interval: Duration,
    ) -> Result<UploadTask, AppError> {
        loop {
            let task = self
                .store
                .get_task(task_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Upload task {}", task_id)))?;
            if task.state.is_terminal() {
                return Ok(task);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
