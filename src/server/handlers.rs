use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AppError;
use crate::render::{render_status, StatusPayload};
use crate::salesforce::SessionContext;
use crate::source;
use crate::state::AppState;
use crate::storage::TaskState;
use crate::tasks::{IngestClientFactory, UploadRequest};

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response Bodies
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct UploadBody {
    pub table: String,
    pub connection_string: String,
    #[serde(default)]
    pub object: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadAccepted {
    pub task_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CancelResponse {
    pub task_id: String,
    /// False when the task had already finished.
    pub cancelled: bool,
}

#[derive(Deserialize)]
pub struct ListParams {
    #[serde(default = "default_list_limit")]
    pub limit: u32,
}

fn default_list_limit() -> u32 {
    20
}

/// One line of the task listing; results stay behind the status route.
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub table: String,
    pub object: String,
    pub state: TaskState,
    pub updated_at: i64,
}

#[derive(Deserialize)]
pub struct TablesBody {
    pub connection_string: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TablesResponse {
    pub tables: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
}

fn require_connection_string(value: &str) -> Result<SecretString, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::InvalidInput("connection_string is required".into()));
    }
    Ok(SecretString::from(value.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// `POST /uploads` queues an upload and answers 202 with its task id.
pub async fn submit_upload<F: IngestClientFactory>(
    State(state): State<Arc<AppState<F>>>,
    Extension(session): Extension<SessionContext>,
    Json(body): Json<UploadBody>,
) -> Result<impl IntoResponse, AppError> {
    let request = UploadRequest {
        table: body.table.trim().to_string(),
        connection_string: require_connection_string(&body.connection_string)?,
        object: body.object,
    };

    let task_id = state.runner.submit(session, request).await?;
    Ok((StatusCode::ACCEPTED, Json(UploadAccepted { task_id })))
}

/// `GET /uploads/:task_id/status`
pub async fn upload_status<F: IngestClientFactory>(
    State(state): State<Arc<AppState<F>>>,
    Path(task_id): Path<String>,
) -> Result<Json<StatusPayload>, AppError> {
    let task = state
        .runner
        .get_task(&task_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Upload task {}", task_id)))?;

    Ok(Json(render_status(Some(&task))))
}

/// `GET /uploads?limit=n` lists the most recent tasks, newest first.
pub async fn list_uploads<F: IngestClientFactory>(
    State(state): State<Arc<AppState<F>>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TaskSummary>>, AppError> {
    let limit = params.limit.clamp(1, 500);
    let tasks = state.runner.store().list_tasks(limit).await?;

    Ok(Json(
        tasks
            .into_iter()
            .map(|t| TaskSummary {
                task_id: t.task_id,
                table: t.table,
                object: t.object,
                state: t.state,
                updated_at: t.updated_at,
            })
            .collect(),
    ))
}

/// `POST /uploads/:task_id/cancel`
pub async fn cancel_upload<F: IngestClientFactory>(
    State(state): State<Arc<AppState<F>>>,
    Path(task_id): Path<String>,
) -> Result<Json<CancelResponse>, AppError> {
    let cancelled = state.runner.cancel(&task_id).await?;
    Ok(Json(CancelResponse { task_id, cancelled }))
}

/// `POST /tables` lists the uploadable tables of a source database.
pub async fn list_tables<F: IngestClientFactory>(
    State(state): State<Arc<AppState<F>>>,
    Json(body): Json<TablesBody>,
) -> Result<Json<TablesResponse>, AppError> {
    let connection_string = require_connection_string(&body.connection_string)?;
    let tables = source::discover_tables(state.runner.connector().as_ref(), &connection_string).await?;
    info!("[SERVER] Listed {} table(s)", tables.len());
    Ok(Json(TablesResponse { tables }))
}

/// `GET /health` checks the task store.
pub async fn health<F: IngestClientFactory>(
    State(state): State<Arc<AppState<F>>>,
) -> Result<Json<HealthResponse>, AppError> {
    if let Err(e) = state.runner.store().health_check().await {
        warn!("[SERVER] Health check failed: {}", e);
        return Err(e);
    }
    Ok(Json(HealthResponse { ok: true }))
}
