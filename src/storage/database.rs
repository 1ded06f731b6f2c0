//! SQLite database module with schema migrations.

use std::path::PathBuf;
use std::time::Duration;

use rusqlite::Connection;
use tracing::debug;

use crate::error::AppError;

/// Schema version written to `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

/// V1 schema: the upload task table.
const V1_SCHEMA: &str = r#"
-- Upload tasks (one per triggered table upload)
CREATE TABLE IF NOT EXISTS upload_tasks (
    task_id TEXT PRIMARY KEY NOT NULL,
    table_name TEXT NOT NULL,
    object_name TEXT NOT NULL,
    state TEXT NOT NULL,
    result_json TEXT,
    error_message TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_upload_tasks_state ON upload_tasks(state);
CREATE INDEX IF NOT EXISTS idx_upload_tasks_created_at ON upload_tasks(created_at);
"#;

/// SQLite database handle.
#[derive(Debug, Clone)]
pub struct Database {
    db_path: PathBuf,
}

impl Database {
    /// Initializes the database at the given path.
    /// Creates parent directories if needed, opens the SQLite file, and runs migrations.
    pub async fn init(db_path: PathBuf) -> Result<Self, AppError> {
        let path = db_path.clone();

        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        AppError::Internal(format!("Failed to create database directory: {e}"))
                    })?;
                }
            }

            let mut conn = open_connection(&path)?;
            run_migrations(&mut conn)?;

            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Database init task failed: {e}")))??;

        Ok(Self { db_path })
    }

    /// Returns the database path for use by other storage modules.
    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    /// Simple health check: executes SELECT 1.
    pub async fn health_check(&self) -> Result<(), AppError> {
        let db_path = self.db_path.clone();

        tokio::task::spawn_blocking(move || {
            let conn = open_connection(&db_path)?;

            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| AppError::Internal(format!("Health check failed: {e}")))?;

            Ok::<_, AppError>(())
        })
        .await
        .map_err(|e| AppError::Internal(format!("Health check task failed: {e}")))??;

        Ok(())
    }
}

/// Opens a configured connection to the database file.
pub(crate) fn open_connection(db_path: &PathBuf) -> Result<Connection, AppError> {
    let conn = Connection::open(db_path)
        .map_err(|e| AppError::Internal(format!("Failed to open database: {e}")))?;
    configure_connection(&conn)?;
    Ok(conn)
}

/// Configures connection with busy timeout and WAL mode.
fn configure_connection(conn: &Connection) -> Result<(), AppError> {
    conn.busy_timeout(Duration::from_secs(10))
        .map_err(|e| AppError::Internal(format!("Failed to set busy timeout: {e}")))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .map_err(|e| AppError::Internal(format!("Failed to set WAL mode: {e}")))?;

    Ok(())
}

/// Migrations in ascending `user_version` order.
const MIGRATIONS: &[(i32, &str)] = &[(1, V1_SCHEMA)];

/// Brings the schema up to [`SCHEMA_VERSION`], tracked in `PRAGMA user_version`.
///
/// A file written by a newer build is left untouched.
fn run_migrations(conn: &mut Connection) -> Result<(), AppError> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .map_err(|e| AppError::Internal(format!("Failed to read schema version: {e}")))?;

    if current_version >= SCHEMA_VERSION {
        return Ok(());
    }

    let tx = conn
        .transaction()
        .map_err(|e| AppError::Internal(format!("Failed to start migration transaction: {e}")))?;

    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current_version) {
        tx.execute_batch(sql)
            .map_err(|e| AppError::Internal(format!("Migration to v{version} failed: {e}")))?;
        debug!("[DB] Applied schema v{}", version);
    }

    tx.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(|e| AppError::Internal(format!("Failed to store schema version: {e}")))?;

    tx.commit()
        .map_err(|e| AppError::Internal(format!("Failed to commit migration: {e}")))?;

    Ok(())
}
