//! Bulk upload protocol on top of the Bulk API v2 ingest client.
//!
//! One upload is a strict sequence:
//!
//! 1. `create_insert_job` - open an insert job for the destination object
//! 2. `post_batch` - upload the CSV payload and mark the upload complete
//! 3. `wait_for_batch` - poll until the job is finished (bounded, cancellable)
//! 4. `get_results` - download per-record outcomes
//! 5. `close_job` - release the remote job (abort if unfinished, else delete)
//!
//! [`BulkUploadAdapter::upload`] runs the whole sequence and always performs
//! step 5 once step 1 succeeded, whatever happens in steps 2 to 4.
//!
//! On Bulk API v2 a job carries exactly one upload, so the batch identifier
//! returned by `post_batch` is the job identifier.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AppError;
use crate::salesforce::bulk_ingest_v2::{
    redact_id, BulkIngestJobInfo, BulkIngestV2Client, CreateIngestJobRequest, ResultKind,
};
use crate::salesforce::BulkJobState;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Header of the per-record outcome columns that frame the submitted columns.
pub const RESULT_ID_COLUMN: &str = "Id";
pub const RESULT_SUCCESS_COLUMN: &str = "Success";
pub const RESULT_CREATED_COLUMN: &str = "Created";
pub const RESULT_ERROR_COLUMN: &str = "Error";

/// How a local table name becomes a Salesforce object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectNaming {
    /// First letter upper-cased, the rest lower-cased (`accounts` → `Accounts`).
    #[default]
    Capitalize,
    /// Table name used unchanged (`My_Object__c` stays as is).
    Verbatim,
}

impl ObjectNaming {
    /// Parses a policy name (case-insensitive).
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "capitalize" => Some(ObjectNaming::Capitalize),
            "verbatim" => Some(ObjectNaming::Verbatim),
            _ => None,
        }
    }

    /// Applies the policy to a local table name.
    pub fn object_name(&self, table: &str) -> String {
        match self {
            ObjectNaming::Verbatim => table.to_string(),
            ObjectNaming::Capitalize => {
                let mut chars = table.chars();
                match chars.next() {
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.flat_map(char::to_lowercase))
                        .collect(),
                    None => String::new(),
                }
            }
        }
    }
}

/// Polling limits for [`BulkUploadAdapter::wait_for_batch`].
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    /// Delay between status polls.
    pub poll_interval: Duration,
    /// Upper bound on the total wait.
    pub max_wait: Duration,
}

/// Outcome of one upload.
///
/// `rows[0]` is the header `Id, Success, Created, <columns...>, Error`; every
/// following row describes one record, and its last field (`Error`) is
/// non-empty exactly when that record was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub rows: Vec<Vec<String>>,
    /// Number of rejected records.
    pub failed: u64,
    /// Number of records Salesforce never processed.
    pub remaining: u64,
}

impl UploadResult {
    /// A result with only the header row (nothing was uploaded).
    pub fn empty(columns: &[String]) -> Self {
        Self {
            rows: vec![result_header(columns)],
            failed: 0,
            remaining: 0,
        }
    }

    pub fn header(&self) -> &[String] {
        self.rows.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.get(1..).unwrap_or(&[])
    }

    /// True when any data row carries a failure flag.
    pub fn has_failures(&self) -> bool {
        self.data_rows().iter().any(|row| row_failed(row))
    }
}

/// Returns true when the row's last field flags a failure.
///
/// Empty, `false` and `0` count as "no failure".
pub fn row_failed(row: &[String]) -> bool {
    match row.last() {
        Some(flag) => {
            let flag = flag.trim();
            !(flag.is_empty() || flag.eq_ignore_ascii_case("false") || flag == "0")
        }
        None => false,
    }
}

fn result_header(columns: &[String]) -> Vec<String> {
    let mut header = Vec::with_capacity(columns.len() + 4);
    header.push(RESULT_ID_COLUMN.to_string());
    header.push(RESULT_SUCCESS_COLUMN.to_string());
    header.push(RESULT_CREATED_COLUMN.to_string());
    header.extend(columns.iter().cloned());
    header.push(RESULT_ERROR_COLUMN.to_string());
    header
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits for Testing
// ─────────────────────────────────────────────────────────────────────────────

/// Trait for ingest client operations, allowing test fakes.
pub trait IngestClientOps: Send + Sync {
    fn create_ingest_job(
        &self,
        req: CreateIngestJobRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + '_>>;

    fn upload_job_data<'a>(
        &'a self,
        job_id: &'a str,
        csv: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    fn complete_upload<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    /// Returns `AppError::JobFailed` for jobs in the `Failed` state.
    fn get_job_status<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<BulkIngestJobInfo, AppError>> + Send + 'a>>;

    fn get_results<'a>(
        &'a self,
        job_id: &'a str,
        kind: ResultKind,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>>;

    fn abort_job<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;

    fn delete_job<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>>;
}

impl IngestClientOps for BulkIngestV2Client {
    fn create_ingest_job(
        &self,
        req: CreateIngestJobRequest,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + '_>> {
        Box::pin(BulkIngestV2Client::create_ingest_job(self, req))
    }

    fn upload_job_data<'a>(
        &'a self,
        job_id: &'a str,
        csv: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(BulkIngestV2Client::upload_job_data(self, job_id, csv))
    }

    fn complete_upload<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(BulkIngestV2Client::complete_upload(self, job_id))
    }

    fn get_job_status<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<BulkIngestJobInfo, AppError>> + Send + 'a>> {
        Box::pin(BulkIngestV2Client::get_job_status(self, job_id))
    }

    fn get_results<'a>(
        &'a self,
        job_id: &'a str,
        kind: ResultKind,
    ) -> Pin<Box<dyn Future<Output = Result<String, AppError>> + Send + 'a>> {
        Box::pin(BulkIngestV2Client::get_results(self, job_id, kind))
    }

    fn abort_job<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(BulkIngestV2Client::abort_job(self, job_id))
    }

    fn delete_job<'a>(
        &'a self,
        job_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send + 'a>> {
        Box::pin(BulkIngestV2Client::delete_job(self, job_id))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkUploadAdapter
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the job → batch → wait → results → close protocol.
pub struct BulkUploadAdapter<C: IngestClientOps> {
    client: C,
    wait: WaitOptions,
}

impl<C: IngestClientOps> BulkUploadAdapter<C> {
    pub fn new(client: C, wait: WaitOptions) -> Self {
        Self { client, wait }
    }

    /// Runs the full sequence for one CSV payload.
    ///
    /// The remote job is closed on every path once it has been created; a
    /// failure to close is logged and never replaces the upload's outcome.
    pub async fn upload(
        &self,
        object: &str,
        columns: &[String],
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, AppError> {
        let job_id = self.create_insert_job(object).await?;

        let outcome = self.run_job(&job_id, columns, payload, cancel).await;

        if let Err(e) = self.close_job(&job_id).await {
            warn!(
                "[BULK-UPLOAD] Failed to close job {}: {}",
                redact_id(&job_id),
                e
            );
        }

        outcome
    }

    async fn run_job(
        &self,
        job_id: &str,
        columns: &[String],
        payload: Vec<u8>,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, AppError> {
        let batch_id = self.post_batch(job_id, payload).await?;
        self.wait_for_batch(job_id, &batch_id, cancel).await?;
        self.get_results(job_id, &batch_id, columns).await
    }

    /// Step 1: opens an insert job with CSV content.
    pub async fn create_insert_job(&self, object: &str) -> Result<String, AppError> {
        let job_id = self
            .client
            .create_ingest_job(CreateIngestJobRequest::insert_csv(object))
            .await?;

        info!(
            "[BULK-UPLOAD] Created insert job {} for {}",
            redact_id(&job_id),
            object
        );

        Ok(job_id)
    }

    /// Step 2: uploads the payload and hands the job to Salesforce.
    ///
    /// Returns the batch identifier, which is the job identifier on Bulk API v2.
    pub async fn post_batch(&self, job_id: &str, payload: Vec<u8>) -> Result<String, AppError> {
        self.client.upload_job_data(job_id, payload).await?;
        self.client.complete_upload(job_id).await?;
        Ok(job_id.to_string())
    }

    /// Step 3: blocks until the batch reaches a terminal state.
    ///
    /// # Errors
    ///
    /// - `AppError::JobFailed` - the job failed or was aborted remotely
    /// - `AppError::Timeout` - still running after `max_wait`
    /// - `AppError::Cancelled` - `cancel` was triggered
    pub async fn wait_for_batch(
        &self,
        job_id: &str,
        batch_id: &str,
        cancel: &CancellationToken,
    ) -> Result<BulkIngestJobInfo, AppError> {
        if batch_id != job_id {
            return Err(AppError::Internal(format!(
                "Batch {} does not belong to job {}",
                redact_id(batch_id),
                redact_id(job_id)
            )));
        }

        let started = Instant::now();

        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let info = self.client.get_job_status(job_id).await?;

            match info.state {
                BulkJobState::JobComplete => {
                    info!(
                        "[BULK-UPLOAD] Job {} complete ({} processed, {} failed)",
                        redact_id(job_id),
                        info.processed_records.unwrap_or(0),
                        info.failed_records.unwrap_or(0)
                    );
                    return Ok(info);
                }
                BulkJobState::Aborted => {
                    return Err(AppError::JobFailed {
                        job_id: job_id.to_string(),
                        message: "Job was aborted".to_string(),
                    });
                }
                BulkJobState::Failed => {
                    return Err(AppError::JobFailed {
                        job_id: job_id.to_string(),
                        message: info
                            .error_message
                            .unwrap_or_else(|| "Unknown error".to_string()),
                    });
                }
                BulkJobState::Open | BulkJobState::UploadComplete | BulkJobState::InProgress => {}
            }

            let elapsed = started.elapsed();
            if elapsed >= self.wait.max_wait {
                return Err(AppError::Timeout {
                    job_id: job_id.to_string(),
                    waited_secs: elapsed.as_secs(),
                });
            }

            let pause = self.wait.poll_interval.min(self.wait.max_wait - elapsed);
            tokio::select! {
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Step 4: downloads the per-record outcomes of a finished batch.
    pub async fn get_results(
        &self,
        job_id: &str,
        batch_id: &str,
        columns: &[String],
    ) -> Result<UploadResult, AppError> {
        let successful = self.client.get_results(batch_id, ResultKind::Successful).await?;
        let failed = self.client.get_results(batch_id, ResultKind::Failed).await?;
        let unprocessed = self.client.get_results(batch_id, ResultKind::Unprocessed).await?;

        let result = build_upload_result(columns, &successful, &failed, &unprocessed)?;

        info!(
            "[BULK-UPLOAD] Job {} results: {} rows, {} failed, {} remaining",
            redact_id(job_id),
            result.rows.len().saturating_sub(1),
            result.failed,
            result.remaining
        );

        Ok(result)
    }

    /// Step 5: releases the remote job.
    ///
    /// Unfinished jobs are aborted; finished ones are deleted. A job whose
    /// state cannot be read is aborted.
    pub async fn close_job(&self, job_id: &str) -> Result<(), AppError> {
        let finished = match self.client.get_job_status(job_id).await {
            Ok(info) => info.state.is_terminal(),
            Err(AppError::JobFailed { .. }) => true,
            Err(e) => {
                warn!(
                    "[BULK-UPLOAD] Could not read state of job {} before closing: {}",
                    redact_id(job_id),
                    e
                );
                false
            }
        };

        if finished {
            self.client.delete_job(job_id).await?;
            info!("[BULK-UPLOAD] Deleted job {}", redact_id(job_id));
        } else {
            self.client.abort_job(job_id).await?;
            info!("[BULK-UPLOAD] Aborted unfinished job {}", redact_id(job_id));
        }

        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Result Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Merges the three result sets into one [`UploadResult`].
fn build_upload_result(
    columns: &[String],
    successful: &str,
    failed: &str,
    unprocessed: &str,
) -> Result<UploadResult, AppError> {
    let mut rows = vec![result_header(columns)];

    let (headers, records) = read_result_csv(successful)?;
    let id_idx = headers.iter().position(|h| h == "sf__Id");
    let created_idx = headers.iter().position(|h| h == "sf__Created");
    let column_idx = column_positions(&headers, columns);
    for record in &records {
        let mut row = Vec::with_capacity(columns.len() + 4);
        row.push(field(record, id_idx));
        row.push("true".to_string());
        row.push(field(record, created_idx));
        row.extend(column_idx.iter().map(|idx| field(record, *idx)));
        row.push(String::new());
        rows.push(row);
    }

    let (headers, records) = read_result_csv(failed)?;
    let id_idx = headers.iter().position(|h| h == "sf__Id");
    let error_idx = headers.iter().position(|h| h == "sf__Error");
    let column_idx = column_positions(&headers, columns);
    for record in &records {
        let mut error = field(record, error_idx);
        if error.trim().is_empty() {
            error = "Unknown error".to_string();
        }
        let mut row = Vec::with_capacity(columns.len() + 4);
        row.push(field(record, id_idx));
        row.push("false".to_string());
        row.push("false".to_string());
        row.extend(column_idx.iter().map(|idx| field(record, *idx)));
        row.push(error);
        rows.push(row);
    }

    let (_, remaining) = read_result_csv(unprocessed)?;

    Ok(UploadResult {
        rows,
        failed: records.len() as u64,
        remaining: remaining.len() as u64,
    })
}

fn read_result_csv(text: &str) -> Result<(Vec<String>, Vec<csv::StringRecord>), AppError> {
    if text.trim().is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| AppError::CsvInvalid(format!("Unreadable result header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::CsvInvalid(format!("Unreadable result row: {}", e)))?;

    Ok((headers, records))
}

fn column_positions(headers: &[String], columns: &[String]) -> Vec<Option<usize>> {
    columns
        .iter()
        .map(|c| headers.iter().position(|h| h.eq_ignore_ascii_case(c)))
        .collect()
}

fn field(record: &csv::StringRecord, idx: Option<usize>) -> String {
    idx.and_then(|i| record.get(i)).unwrap_or_default().to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
