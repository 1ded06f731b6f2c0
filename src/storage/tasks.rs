//! Upload task persistence for SQLite.
//!
//! Each triggered upload is one row in `upload_tasks`. The row moves
//! `PENDING → RUNNING → SUCCEEDED | FAILED` and carries either the serialized
//! [`UploadResult`] or the failure description once it is terminal.
//!
//! The process running an open task refreshes its `updated_at` as a
//! heartbeat. Only rows whose heartbeat went stale count as interrupted, so
//! several processes can share one database file.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::salesforce::UploadResult;
use crate::storage::database::{open_connection, Database};

// ─────────────────────────────────────────────────────────────────────────────
// TaskState Enum
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of an upload task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    /// Converts the state to its string representation for database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Running => "RUNNING",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
        }
    }

    /// Parses a stored state. Unknown strings are treated as `Failed` so a
    /// corrupt row is never reported as still running.
    pub fn from_str(s: &str) -> Self {
        match s {
            "PENDING" => TaskState::Pending,
            "RUNNING" => TaskState::Running,
            "SUCCEEDED" => TaskState::Succeeded,
            _ => TaskState::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Data Types
// ─────────────────────────────────────────────────────────────────────────────

/// One persisted upload task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTask {
    pub task_id: String,
    /// Qualified source table (`schema.table`).
    pub table: String,
    /// Destination Salesforce object.
    pub object: String,
    pub state: TaskState,
    pub result: Option<UploadResult>,
    pub error: Option<String>,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds.
    pub updated_at: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// TaskStore Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Persistence operations used by the task runner.
pub trait TaskStore: Send + Sync {
    /// Stores a new `PENDING` task.
    fn insert_task<'a>(
        &'a self,
        task_id: &'a str,
        table: &'a str,
        object: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// `PENDING → RUNNING`.
    fn mark_running<'a>(
        &'a self,
        task_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// Stores the result of a finished task.
    fn mark_succeeded<'a>(
        &'a self,
        task_id: &'a str,
        result: &'a UploadResult,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// Stores the failure description of a finished task.
    fn mark_failed<'a>(
        &'a self,
        task_id: &'a str,
        error: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    fn get_task<'a>(
        &'a self,
        task_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UploadTask>, AppError>> + Send + 'a>>;

    /// Most recent tasks first.
    fn list_tasks(
        &self,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UploadTask>, AppError>> + Send + '_>>;

    /// Refreshes the heartbeat of an open task. A finished or unknown task
    /// is left alone.
    fn touch_task<'a>(
        &'a self,
        task_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// Fails every open task whose heartbeat is older than `stale_after`.
    /// Returns how many rows were touched.
    fn fail_interrupted(
        &self,
        stale_after: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<u64, AppError>> + Send + '_>>;

    fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + '_>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Description stored for tasks that were open when the process stopped.
pub const INTERRUPTED_MESSAGE: &str = "Upload was interrupted by a service restart";

/// Returns current unix timestamp in seconds.
fn current_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

const SELECT_TASK_COLUMNS: &str = "task_id, table_name, object_name, state, result_json, \
     error_message, created_at, updated_at";

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<(UploadTask, Option<String>)> {
    let state: String = row.get(3)?;
    let task = UploadTask {
        task_id: row.get(0)?,
        table: row.get(1)?,
        object: row.get(2)?,
        state: TaskState::from_str(&state),
        result: None,
        error: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    };
    Ok((task, row.get(4)?))
}

fn attach_result(
    (mut task, result_json): (UploadTask, Option<String>),
) -> Result<UploadTask, AppError> {
    if let Some(json) = result_json {
        let result = serde_json::from_str(&json).map_err(|e| {
            AppError::Internal(format!("Stored result for task {} is corrupt: {e}", task.task_id))
        })?;
        task.result = Some(result);
    }
    Ok(task)
}

/// Runs `op` against a fresh connection on the blocking pool.
async fn with_connection<T, F>(db_path: PathBuf, label: &'static str, op: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, AppError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = open_connection(&db_path)?;
        op(&mut conn)
    })
    .await
    .map_err(|e| AppError::Internal(format!("{label} task failed: {e}")))?
}

/// Applies a guarded state transition; zero affected rows means the task is
/// unknown or already past `from`.
fn transition(
    conn: &Connection,
    task_id: &str,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<(), AppError> {
    let updated = conn
        .execute(sql, params)
        .map_err(|e| AppError::Internal(format!("Failed to update task state: {e}")))?;
    if updated == 0 {
        return Err(AppError::NotFound(format!("Open upload task {}", task_id)));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// [`TaskStore`] backed by the local SQLite database.
#[derive(Debug, Clone)]
pub struct DatabaseTaskStore {
    db: Database,
}

impl DatabaseTaskStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn db_path(&self) -> PathBuf {
        self.db.db_path().clone()
    }
}

impl TaskStore for DatabaseTaskStore {
    fn insert_task<'a>(
        &'a self,
        task_id: &'a str,
        table: &'a str,
        object: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        let task_id = task_id.to_string();
        let table = table.to_string();
        let object = object.to_string();
        let now = current_timestamp();

        Box::pin(with_connection(self.db_path(), "Insert task", move |conn| {
            conn.execute(
                r#"
                INSERT INTO upload_tasks (task_id, table_name, object_name, state, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                "#,
                rusqlite::params![task_id, table, object, TaskState::Pending.as_str(), now],
            )
            .map_err(|e| AppError::Internal(format!("Failed to insert task: {e}")))?;
            Ok(())
        }))
    }

    fn mark_running<'a>(
        &'a self,
        task_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        let task_id = task_id.to_string();
        let now = current_timestamp();

        Box::pin(with_connection(self.db_path(), "Mark running", move |conn| {
            transition(
                conn,
                &task_id,
                "UPDATE upload_tasks SET state = ?1, updated_at = ?2 WHERE task_id = ?3 AND state = ?4",
                &[
                    &TaskState::Running.as_str(),
                    &now,
                    &task_id,
                    &TaskState::Pending.as_str(),
                ],
            )
        }))
    }

    fn mark_succeeded<'a>(
        &'a self,
        task_id: &'a str,
        result: &'a UploadResult,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        let task_id = task_id.to_string();
        let now = current_timestamp();
        let result_json = serde_json::to_string(result);

        Box::pin(async move {
            let result_json = result_json
                .map_err(|e| AppError::Internal(format!("Failed to serialize result: {e}")))?;
            with_connection(self.db_path(), "Mark succeeded", move |conn| {
                transition(
                    conn,
                    &task_id,
                    r#"
                    UPDATE upload_tasks
                    SET state = ?1, result_json = ?2, error_message = NULL, updated_at = ?3
                    WHERE task_id = ?4 AND state IN ('PENDING', 'RUNNING')
                    "#,
                    &[&TaskState::Succeeded.as_str(), &result_json, &now, &task_id],
                )
            })
            .await
        })
    }

    fn mark_failed<'a>(
        &'a self,
        task_id: &'a str,
        error: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        let task_id = task_id.to_string();
        let error = error.to_string();
        let now = current_timestamp();

        Box::pin(with_connection(self.db_path(), "Mark failed", move |conn| {
            transition(
                conn,
                &task_id,
                r#"
                UPDATE upload_tasks
                SET state = ?1, error_message = ?2, result_json = NULL, updated_at = ?3
                WHERE task_id = ?4 AND state IN ('PENDING', 'RUNNING')
                "#,
                &[&TaskState::Failed.as_str(), &error, &now, &task_id],
            )
        }))
    }

    fn get_task<'a>(
        &'a self,
        task_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<UploadTask>, AppError>> + Send + 'a>> {
        let task_id = task_id.to_string();

        Box::pin(with_connection(self.db_path(), "Get task", move |conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {SELECT_TASK_COLUMNS} FROM upload_tasks WHERE task_id = ?1"),
                    [&task_id],
                    task_from_row,
                )
                .optional()
                .map_err(|e| AppError::Internal(format!("Failed to query task: {e}")))?;

            row.map(attach_result).transpose()
        }))
    }

    fn list_tasks(
        &self,
        limit: u32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<UploadTask>, AppError>> + Send + '_>> {
        Box::pin(with_connection(self.db_path(), "List tasks", move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {SELECT_TASK_COLUMNS} FROM upload_tasks \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?1"
                ))
                .map_err(|e| AppError::Internal(format!("Failed to prepare query: {e}")))?;

            let rows = stmt
                .query_map([limit], task_from_row)
                .map_err(|e| AppError::Internal(format!("Failed to query tasks: {e}")))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::Internal(format!("Failed to collect tasks: {e}")))?;

            rows.into_iter().map(attach_result).collect()
        }))
    }

    fn touch_task<'a>(
        &'a self,
        task_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        let task_id = task_id.to_string();
        let now = current_timestamp();

        Box::pin(with_connection(self.db_path(), "Touch task", move |conn| {
            conn.execute(
                "UPDATE upload_tasks SET updated_at = ?1 \
                 WHERE task_id = ?2 AND state IN ('PENDING', 'RUNNING')",
                rusqlite::params![now, task_id],
            )
            .map_err(|e| AppError::Internal(format!("Failed to refresh task heartbeat: {e}")))?;
            Ok(())
        }))
    }

    fn fail_interrupted(
        &self,
        stale_after: Duration,
    ) -> Pin<Box<dyn Future<Output = Result<u64, AppError>> + Send + '_>> {
        let now = current_timestamp();
        let cutoff = now - stale_after.as_secs() as i64;

        Box::pin(with_connection(self.db_path(), "Fail interrupted", move |conn| {
            let updated = conn
                .execute(
                    r#"
                    UPDATE upload_tasks
                    SET state = ?1, error_message = ?2, updated_at = ?3
                    WHERE state IN ('PENDING', 'RUNNING') AND updated_at <= ?4
                    "#,
                    rusqlite::params![TaskState::Failed.as_str(), INTERRUPTED_MESSAGE, now, cutoff],
                )
                .map_err(|e| AppError::Internal(format!("Failed to fail interrupted tasks: {e}")))?;
            Ok(updated as u64)
        }))
    }

    fn health_check(&self) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + '_>> {
        Box::pin(self.db.health_check())
    }
}
