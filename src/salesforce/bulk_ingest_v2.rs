//! Salesforce Bulk API v2 Ingest Client.
//!
//! This module provides functionality to:
//! - Create insert jobs with CSV content
//! - Upload an in-memory CSV payload to a job
//! - Mark the upload complete, abort, and delete jobs
//! - Poll job status
//! - Download successful, failed and unprocessed record CSVs
//!
//! # Security
//!
//! - Raw CSV contents are never logged
//! - Auth headers and tokens are never logged
//! - Only HTTP method, path, and status codes are logged

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;

use crate::error::AppError;
use crate::salesforce::{BulkJobState, API_VERSION};

/// User agent sent with every Salesforce request.
const CLIENT_USER_AGENT: &str = concat!("table-stampede/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout. Large uploads are a single PUT, so this is generous.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Bulk ingest operation type.
///
/// Serialized lowercase, as the API expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkOperation {
    Insert,
}

/// Line ending format for CSV payloads.
#[derive(Debug, Clone, Copy, Serialize)]
pub enum LineEnding {
    LF,
}

/// Request body for creating an ingest job.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIngestJobRequest {
    /// The Salesforce object name (e.g., "Account", "Contact").
    pub object: String,
    pub operation: BulkOperation,
    /// Always "CSV".
    pub content_type: &'static str,
    pub line_ending: LineEnding,
}

impl CreateIngestJobRequest {
    /// Insert job for `object` with LF-terminated CSV content.
    pub fn insert_csv(object: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            operation: BulkOperation::Insert,
            content_type: "CSV",
            line_ending: LineEnding::LF,
        }
    }
}

/// Information about a Bulk API v2 ingest job.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkIngestJobInfo {
    /// Unique identifier for the job.
    pub id: String,
    /// Current state of the job.
    pub state: BulkJobState,
    /// The Salesforce object being processed.
    #[serde(default)]
    pub object: Option<String>,
    /// Number of records processed so far.
    #[serde(default, rename = "numberRecordsProcessed")]
    pub processed_records: Option<u64>,
    /// Number of records that failed processing.
    #[serde(default, rename = "numberRecordsFailed")]
    pub failed_records: Option<u64>,
    /// Error message if job failed.
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Result sets Salesforce keeps for a finished ingest job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    /// `sf__Id`, `sf__Created`, then the submitted columns.
    Successful,
    /// `sf__Id`, `sf__Error`, then the submitted columns.
    Failed,
    /// The submitted columns only.
    Unprocessed,
}

impl ResultKind {
    /// Path segment under `/jobs/ingest/{id}/`.
    pub fn path_segment(&self) -> &'static str {
        match self {
            ResultKind::Successful => "successfulResults",
            ResultKind::Failed => "failedResults",
            ResultKind::Unprocessed => "unprocessedrecords",
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for changing job state (upload complete or abort).
#[derive(Debug, Serialize)]
struct UpdateJobStateRequest {
    state: &'static str,
}

/// Salesforce API error response format.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SalesforceError {
    message: String,
    error_code: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// BulkIngestV2Client
// ─────────────────────────────────────────────────────────────────────────────

/// Client for Salesforce Bulk API v2 ingest operations.
#[derive(Clone)]
pub struct BulkIngestV2Client {
    /// Shared HTTP client.
    client: Arc<Client>,
    /// Base instance URL (e.g., "https://na1.salesforce.com").
    base_url: Url,
    access_token: SecretString,
}

impl BulkIngestV2Client {
    pub fn new(client: Arc<Client>, base_url: Url, access_token: SecretString) -> Self {
        Self {
            client,
            base_url,
            access_token,
        }
    }

    /// Creates a new bulk ingest job.
    ///
    /// # Returns
    ///
    /// The job ID on success.
    ///
    /// # Errors
    ///
    /// - `AppError::SalesforceError` - API error (e.g. unknown object)
    /// - `AppError::RateLimited` - Rate limit exceeded
    /// - `AppError::ConnectionFailed` - Network error
    pub async fn create_ingest_job(&self, req: CreateIngestJobRequest) -> Result<String, AppError> {
        let url = self.build_jobs_url()?;

        info!("[BULK-INGEST] POST /jobs/ingest (creating insert job for {})", req.object);

        let response = self
            .client
            .post(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&req)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Ingest job creation failed: {}", e)))?;

        let status = response.status();
        info!("[BULK-INGEST] POST /jobs/ingest -> {}", status.as_u16());

        if !status.is_success() {
            return Err(self.parse_error_response(response, status).await);
        }

        let job_info: BulkIngestJobInfo = response.json().await.map_err(|e| {
            AppError::SalesforceError(format!("Failed to parse job creation response: {}", e))
        })?;

        Ok(job_info.id)
    }

    /// Uploads the CSV payload to the job in a single PUT.
    ///
    /// # Errors
    ///
    /// - `AppError::SalesforceError` - API error
    /// - `AppError::ConnectionFailed` - Network error
    pub async fn upload_job_data(&self, job_id: &str, csv: Vec<u8>) -> Result<(), AppError> {
        let url = self.build_batches_url(job_id)?;

        info!(
            "[BULK-INGEST] PUT /jobs/ingest/{}/batches ({} bytes)",
            redact_id(job_id),
            csv.len()
        );

        let response = self
            .client
            .put(url)
            .bearer_auth(self.access_token.expose_secret())
            .header("Content-Type", "text/csv")
            .body(csv)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("CSV upload failed: {}", e)))?;

        let status = response.status();
        info!(
            "[BULK-INGEST] PUT /jobs/ingest/{}/batches -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(self.parse_error_response(response, status).await);
        }

        Ok(())
    }

    /// Marks the upload complete so Salesforce queues the job for processing.
    pub async fn complete_upload(&self, job_id: &str) -> Result<(), AppError> {
        self.update_state(job_id, "UploadComplete").await
    }

    /// Aborts a job that has not finished yet.
    pub async fn abort_job(&self, job_id: &str) -> Result<(), AppError> {
        self.update_state(job_id, "Aborted").await
    }

    /// Gets the current status of a bulk ingest job.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` - Job not found
    /// - `AppError::JobFailed` - Job is in failed state
    /// - `AppError::SalesforceError` - API error
    pub async fn get_job_status(&self, job_id: &str) -> Result<BulkIngestJobInfo, AppError> {
        let url = self.build_job_url(job_id)?;

        info!("[BULK-INGEST] GET /jobs/ingest/{} (status)", redact_id(job_id));

        let response = self
            .client
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Job status check failed: {}", e)))?;

        let status = response.status();
        info!(
            "[BULK-INGEST] GET /jobs/ingest/{} -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(self.parse_error_response(response, status).await);
        }

        let job_info: BulkIngestJobInfo = response.json().await.map_err(|e| {
            AppError::SalesforceError(format!("Failed to parse job status response: {}", e))
        })?;

        if job_info.state == BulkJobState::Failed {
            return Err(AppError::JobFailed {
                job_id: job_id.to_string(),
                message: job_info
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "Unknown error".to_string()),
            });
        }

        Ok(job_info)
    }

    /// Deletes a finished job and its result sets.
    pub async fn delete_job(&self, job_id: &str) -> Result<(), AppError> {
        let url = self.build_job_url(job_id)?;

        info!("[BULK-INGEST] DELETE /jobs/ingest/{}", redact_id(job_id));

        let response = self
            .client
            .delete(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Job delete failed: {}", e)))?;

        let status = response.status();
        info!(
            "[BULK-INGEST] DELETE /jobs/ingest/{} -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(self.parse_error_response(response, status).await);
        }

        Ok(())
    }

    /// Downloads one of the job's result sets as CSV text.
    ///
    /// # Errors
    ///
    /// - `AppError::NotFound` - Job not found
    /// - `AppError::SalesforceError` - API error or non-UTF-8 body
    pub async fn get_results(&self, job_id: &str, kind: ResultKind) -> Result<String, AppError> {
        let result_type = kind.path_segment();
        let url = self.build_results_url(job_id, result_type)?;

        info!(
            "[BULK-INGEST] GET /jobs/ingest/{}/{} (downloading)",
            redact_id(job_id),
            result_type
        );

        let response = self
            .client
            .get(url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .map_err(|e| {
                AppError::ConnectionFailed(format!("{} download failed: {}", result_type, e))
            })?;

        let status = response.status();
        info!(
            "[BULK-INGEST] GET /jobs/ingest/{}/{} -> {}",
            redact_id(job_id),
            result_type,
            status.as_u16()
        );

        if !status.is_success() {
            return Err(self.parse_error_response(response, status).await);
        }

        let body = response.text().await.map_err(|e| {
            AppError::ConnectionFailed(format!("Error reading {} body: {}", result_type, e))
        })?;

        info!(
            "[BULK-INGEST] {} download complete for job {}: {} bytes",
            result_type,
            redact_id(job_id),
            body.len()
        );

        Ok(body)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Private Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// PATCHes the job state ("UploadComplete" or "Aborted").
    async fn update_state(&self, job_id: &str, state: &'static str) -> Result<(), AppError> {
        let url = self.build_job_url(job_id)?;
        let request_body = UpdateJobStateRequest { state };

        info!(
            "[BULK-INGEST] PATCH /jobs/ingest/{} (state -> {})",
            redact_id(job_id),
            state
        );

        let response = self
            .client
            .patch(url)
            .bearer_auth(self.access_token.expose_secret())
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AppError::ConnectionFailed(format!("Job state change to {} failed: {}", state, e)))?;

        let status = response.status();
        info!(
            "[BULK-INGEST] PATCH /jobs/ingest/{} -> {}",
            redact_id(job_id),
            status.as_u16()
        );

        if !status.is_success() {
            return Err(self.parse_error_response(response, status).await);
        }

        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Builders
    // ─────────────────────────────────────────────────────────────────────────

    /// /services/data/vXX.X/jobs/ingest
    fn build_jobs_url(&self) -> Result<Url, AppError> {
        let path = format!("/services/data/{}/jobs/ingest", API_VERSION);
        self.base_url
            .join(&path)
            .map_err(|e| AppError::Internal(format!("Failed to build jobs URL: {}", e)))
    }

    /// /services/data/vXX.X/jobs/ingest/{job_id}
    fn build_job_url(&self, job_id: &str) -> Result<Url, AppError> {
        let path = format!("/services/data/{}/jobs/ingest/{}", API_VERSION, job_id);
        self.base_url
            .join(&path)
            .map_err(|e| AppError::Internal(format!("Failed to build job URL: {}", e)))
    }

    /// /services/data/vXX.X/jobs/ingest/{job_id}/batches
    fn build_batches_url(&self, job_id: &str) -> Result<Url, AppError> {
        let path = format!("/services/data/{}/jobs/ingest/{}/batches", API_VERSION, job_id);
        self.base_url
            .join(&path)
            .map_err(|e| AppError::Internal(format!("Failed to build batches URL: {}", e)))
    }

    /// /services/data/vXX.X/jobs/ingest/{job_id}/{result_type}
    fn build_results_url(&self, job_id: &str, result_type: &str) -> Result<Url, AppError> {
        let path = format!(
            "/services/data/{}/jobs/ingest/{}/{}",
            API_VERSION, job_id, result_type
        );
        self.base_url
            .join(&path)
            .map_err(|e| AppError::Internal(format!("Failed to build results URL: {}", e)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Error Handling
    // ─────────────────────────────────────────────────────────────────────────

    /// Parses an error response and maps to appropriate AppError.
    async fn parse_error_response(
        &self,
        response: reqwest::Response,
        status: reqwest::StatusCode,
    ) -> AppError {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return AppError::RateLimited {
                retry_after_secs: retry_after,
            };
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return AppError::SessionExpired;
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return AppError::NotFound("Bulk ingest job not found".to_string());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("Unable to read error body"));

        if let Ok(errors) = serde_json::from_str::<Vec<SalesforceError>>(&body) {
            if let Some(first_error) = errors.first() {
                if first_error.error_code == "REQUEST_LIMIT_EXCEEDED" {
                    return AppError::RateLimited {
                        retry_after_secs: None,
                    };
                }

                return AppError::SalesforceError(format!(
                    "[{}] {}",
                    first_error.error_code, first_error.message
                ));
            }
        }

        AppError::SalesforceError(format!(
            "HTTP {} - {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown error")
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helper Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Builds the shared HTTP client used for all Salesforce calls.
pub fn build_http_client() -> Result<Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    Client::builder()
        .default_headers(headers)
        .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Redacts an ID for logging (shows first 8 chars).
pub(crate) fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &id[..idx]),
        None => id.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Helper to create a test client pointing to mock server.
    fn create_test_client(mock_url: &str) -> BulkIngestV2Client {
        let client = Arc::new(Client::new());
        let base_url = Url::parse(mock_url).unwrap();
        BulkIngestV2Client::new(client, base_url, SecretString::from("test_token".to_string()))
    }

    fn job_path(suffix: &str) -> String {
        format!("/services/data/{}/jobs/ingest{}", API_VERSION, suffix)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Create Job Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_ingest_job_sends_insert_csv_request() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        let expected_request = serde_json::json!({
            "object": "Accounts",
            "operation": "insert",
            "contentType": "CSV",
            "lineEnding": "LF"
        });

        Mock::given(method("POST"))
            .and(path(job_path("")))
            .and(header("Authorization", "Bearer test_token"))
            .and(body_json(&expected_request))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "750xx000000001ABC",
                "state": "Open",
                "object": "Accounts",
                "operation": "insert"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let job_id = client
            .create_ingest_job(CreateIngestJobRequest::insert_csv("Accounts"))
            .await
            .unwrap();

        assert_eq!(job_id, "750xx000000001ABC");
    }

    #[tokio::test]
    async fn test_create_job_unknown_object_maps_salesforce_error() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path(job_path("")))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!([
                { "errorCode": "INVALIDENTITY", "message": "sObject type 'Widgets' is not supported." }
            ])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let err = client
            .create_ingest_job(CreateIngestJobRequest::insert_csv("Widgets"))
            .await
            .unwrap_err();

        match err {
            AppError::SalesforceError(msg) => {
                assert!(msg.starts_with("[INVALIDENTITY]"), "got: {}", msg);
            }
            other => panic!("expected SalesforceError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_reads_retry_after() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path(job_path("")))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "42"))
            .mount(&mock_server)
            .await;

        let err = client
            .create_ingest_job(CreateIngestJobRequest::insert_csv("Account"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RateLimited { retry_after_secs: Some(42) }));
    }

    #[tokio::test]
    async fn test_expired_token_maps_session_expired() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path(job_path("")))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!([
                { "errorCode": "INVALID_SESSION_ID", "message": "Session expired or invalid" }
            ])))
            .mount(&mock_server)
            .await;

        let err = client
            .create_ingest_job(CreateIngestJobRequest::insert_csv("Account"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::SessionExpired));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Upload / State Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_upload_job_data_puts_csv_body() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("PUT"))
            .and(path(job_path("/750xx000000001ABC/batches")))
            .and(header("Content-Type", "text/csv"))
            .and(body_string("name,email\nAcme,a@b.com\n"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        client
            .upload_job_data("750xx000000001ABC", b"name,email\nAcme,a@b.com\n".to_vec())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_complete_upload_and_abort_patch_state() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("PATCH"))
            .and(path(job_path("/750A")))
            .and(body_json(serde_json::json!({ "state": "UploadComplete" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "750A", "state": "UploadComplete"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("PATCH"))
            .and(path(job_path("/750B")))
            .and(body_json(serde_json::json!({ "state": "Aborted" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "750B", "state": "Aborted"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        client.complete_upload("750A").await.unwrap();
        client.abort_job("750B").await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_job() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("DELETE"))
            .and(path(job_path("/750A")))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        client.delete_job("750A").await.unwrap();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_get_job_status_parses_counts() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path(job_path("/750A")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "750A",
                "state": "JobComplete",
                "object": "Accounts",
                "operation": "insert",
                "numberRecordsProcessed": 10,
                "numberRecordsFailed": 2
            })))
            .mount(&mock_server)
            .await;

        let info = client.get_job_status("750A").await.unwrap();
        assert_eq!(info.state, BulkJobState::JobComplete);
        assert_eq!(info.processed_records, Some(10));
        assert_eq!(info.failed_records, Some(2));
    }

    #[tokio::test]
    async fn test_get_job_status_failed_maps_job_failed() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path(job_path("/750A")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "750A",
                "state": "Failed",
                "errorMessage": "InvalidBatch : Field name not found : Colour"
            })))
            .mount(&mock_server)
            .await;

        let err = client.get_job_status("750A").await.unwrap_err();
        match err {
            AppError::JobFailed { job_id, message } => {
                assert_eq!(job_id, "750A");
                assert!(message.contains("Colour"));
            }
            other => panic!("expected JobFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_get_job_status_not_found() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path(job_path("/750missing")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let err = client.get_job_status("750missing").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unparseable_error_body_falls_back_to_http_status() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path(job_path("/750A")))
            .respond_with(ResponseTemplate::new(503).set_body_string("<html>maintenance</html>"))
            .mount(&mock_server)
            .await;

        let err = client.get_job_status("750A").await.unwrap_err();
        match err {
            AppError::SalesforceError(msg) => assert!(msg.starts_with("HTTP 503"), "got: {}", msg),
            other => panic!("expected SalesforceError, got {:?}", other),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Result Download Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_get_results_downloads_each_kind() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri());

        for (segment, body) in [
            ("successfulResults", "\"sf__Id\",\"sf__Created\",name\n\"001A\",\"true\",\"Acme\"\n"),
            ("failedResults", "\"sf__Id\",\"sf__Error\",name\n"),
            ("unprocessedrecords", "name\n"),
        ] {
            Mock::given(method("GET"))
                .and(path(job_path(&format!("/750A/{}", segment))))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .expect(1)
                .mount(&mock_server)
                .await;
        }

        let ok = client.get_results("750A", ResultKind::Successful).await.unwrap();
        let failed = client.get_results("750A", ResultKind::Failed).await.unwrap();
        let unprocessed = client.get_results("750A", ResultKind::Unprocessed).await.unwrap();

        assert!(ok.contains("001A"));
        assert!(failed.starts_with("\"sf__Id\",\"sf__Error\""));
        assert_eq!(unprocessed, "name\n");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helper Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_redact_id() {
        assert_eq!(redact_id("750xx000000001ABC"), "750xx000...");
        assert_eq!(redact_id("short"), "short");
        assert_eq!(redact_id("12345678"), "12345678");
    }

    #[test]
    fn build_http_client_succeeds() {
        assert!(build_http_client().is_ok());
    }
}
