//! Salesforce Bulk API layer.
//!
//! - **`bulk_ingest_v2`**: thin HTTP client for the Bulk API v2 ingest endpoints
//! - **`bulk_upload`**: the job → batch → wait → results → close protocol on top of it
//! - **`session`**: the explicit session context (access token + instance URL)

pub mod bulk_ingest_v2;
pub mod bulk_upload;
pub mod session;

use serde::{Deserialize, Serialize};

pub use bulk_ingest_v2::{BulkIngestJobInfo, BulkIngestV2Client, ResultKind};
pub use bulk_upload::{
    row_failed, BulkUploadAdapter, IngestClientOps, ObjectNaming, UploadResult, WaitOptions,
};
pub use session::SessionContext;

/// REST API version used for every Bulk API v2 call.
pub const API_VERSION: &str = "v60.0";

// ─────────────────────────────────────────────────────────────────────────────
// BulkJobState
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of a Bulk API v2 ingest job, spelled as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulkJobState {
    Open,
    UploadComplete,
    InProgress,
    JobComplete,
    Failed,
    Aborted,
}

impl BulkJobState {
    /// Returns true once Salesforce will no longer change the job.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BulkJobState::JobComplete | BulkJobState::Failed | BulkJobState::Aborted
        )
    }
}
