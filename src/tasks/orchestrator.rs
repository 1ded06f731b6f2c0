//! Table upload orchestration.
//!
//! One run reads a source table end to end and pushes it through the bulk
//! upload protocol:
//!
//! 1. Parse the qualified table name
//! 2. Open a source session
//! 3. Resolve the eligible columns
//! 4. Read every row, then release the session
//! 5. Encode the rows into a CSV payload
//! 6. Upload the payload (skipped for an empty table)
//!
//! The source session is closed on every path once it has been opened.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::codec::{build_csv_payload, encode_row};
use crate::error::AppError;
use crate::salesforce::{BulkUploadAdapter, IngestClientOps, ObjectNaming, UploadResult};
use crate::source::{list_columns, SourceColumn, SourceConnector, SourceSession, SourceValue, TableRef};

/// What to upload and where to.
#[derive(Clone)]
pub struct UploadRequest {
    /// Qualified source table, `schema.table`.
    pub table: String,
    pub connection_string: SecretString,
    /// Destination object; derived from the table name when absent.
    pub object: Option<String>,
}

impl std::fmt::Debug for UploadRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadRequest")
            .field("table", &self.table)
            .field("connection_string", &"[REDACTED]")
            .field("object", &self.object)
            .finish()
    }
}

/// Destination object for `table`: the explicit override when it is
/// non-blank, otherwise the naming policy applied to the bare table name.
pub fn resolve_object(naming: ObjectNaming, table: &TableRef, object: Option<&str>) -> String {
    match object.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => naming.object_name(&table.table),
    }
}

/// Runs one table upload against one source and one Salesforce session.
pub struct UploadOrchestrator<C: IngestClientOps> {
    connector: Arc<dyn SourceConnector>,
    adapter: BulkUploadAdapter<C>,
    naming: ObjectNaming,
}

impl<C: IngestClientOps> UploadOrchestrator<C> {
    pub fn new(
        connector: Arc<dyn SourceConnector>,
        adapter: BulkUploadAdapter<C>,
        naming: ObjectNaming,
    ) -> Self {
        Self {
            connector,
            adapter,
            naming,
        }
    }

    /// Uploads the table named in `request` and returns the per-record result.
    pub async fn run(
        &self,
        request: &UploadRequest,
        cancel: &CancellationToken,
    ) -> Result<UploadResult, AppError> {
        let table = TableRef::parse(&request.table)?;
        let object = resolve_object(self.naming, &table, request.object.as_deref());

        let mut session = self
            .connector
            .connect(request.connection_string.expose_secret())
            .await?;

        let read = read_table(session.as_mut(), &table).await;

        if let Err(e) = session.close().await {
            warn!("[ORCHESTRATOR] Failed to close source session for {}: {}", table, e);
        }

        let (columns, values) = read?;
        let header: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

        let rows = values
            .iter()
            .map(|row| encode_row(&columns, row))
            .collect::<Result<Vec<_>, _>>()?;

        if rows.is_empty() {
            info!("[ORCHESTRATOR] {} is empty; nothing to upload", table);
            return Ok(UploadResult::empty(&header));
        }

        let payload = build_csv_payload(&header, &rows)?;

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        info!(
            "[ORCHESTRATOR] Uploading {} record(s) from {} to {} ({} bytes)",
            payload.record_count,
            table,
            object,
            payload.bytes.len()
        );

        self.adapter.upload(&object, &header, payload.bytes, cancel).await
    }
}

/// Resolves the eligible columns of `table` and reads all of its rows.
async fn read_table(
    session: &mut dyn SourceSession,
    table: &TableRef,
) -> Result<(Vec<SourceColumn>, Vec<Vec<SourceValue>>), AppError> {
    let columns = list_columns(session, table).await?;
    if columns.is_empty() {
        return Err(AppError::InvalidInput(format!(
            "Table {} has no uploadable columns",
            table
        )));
    }

    let rows = session.fetch_rows(table, &columns).await?;
    Ok((columns, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::salesforce::bulk_upload::tests::FakeIngestClient;
    use crate::salesforce::{BulkJobState, WaitOptions};
    use crate::source::fakes::{FakeConnector, FakeTable};
    use crate::source::ColumnKind;
    use std::time::Duration;

    const ACCOUNTS_SUCCESS: &str = "sf__Id,sf__Created,name,email\n001A,true,Acme,a@b.com\n";
    const NO_FAILURES: &str = "sf__Id,sf__Error,name,email\n";
    const NO_UNPROCESSED: &str = "name,email\n";

    fn fast_wait() -> WaitOptions {
        WaitOptions {
            poll_interval: Duration::from_millis(5),
            max_wait: Duration::from_secs(5),
        }
    }

    fn accounts_connector() -> FakeConnector {
        let ts = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        FakeConnector::with_table(
            "public.accounts",
            FakeTable {
                columns: vec![
                    SourceColumn::new("id", ColumnKind::Integer),
                    SourceColumn::new("name", ColumnKind::Text),
                    SourceColumn::new("_hidden", ColumnKind::Text),
                    SourceColumn::new("SystemModstamp", ColumnKind::Timestamp),
                    SourceColumn::new("email", ColumnKind::Text),
                ],
                rows: vec![vec![
                    SourceValue::Int(1),
                    SourceValue::Text("Acme".into()),
                    SourceValue::Text("secret".into()),
                    SourceValue::Timestamp(ts),
                    SourceValue::Text("a@b.com".into()),
                ]],
            },
        )
    }

    fn request(table: &str) -> UploadRequest {
        UploadRequest {
            table: table.to_string(),
            connection_string: SecretString::from("postgres://user:pw@db/crm".to_string()),
            object: None,
        }
    }

    fn orchestrator(
        connector: &FakeConnector,
        client: &FakeIngestClient,
    ) -> UploadOrchestrator<FakeIngestClient> {
        UploadOrchestrator::new(
            Arc::new(connector.clone()),
            BulkUploadAdapter::new(client.clone(), fast_wait()),
            ObjectNaming::Capitalize,
        )
    }

    #[test]
    fn object_override_wins_over_naming() {
        let table = TableRef::parse("public.accounts").unwrap();
        assert_eq!(resolve_object(ObjectNaming::Capitalize, &table, None), "Accounts");
        assert_eq!(resolve_object(ObjectNaming::Capitalize, &table, Some("  ")), "Accounts");
        assert_eq!(
            resolve_object(ObjectNaming::Capitalize, &table, Some("Account")),
            "Account"
        );
        assert_eq!(resolve_object(ObjectNaming::Verbatim, &table, None), "accounts");
    }

    #[tokio::test]
    async fn uploads_eligible_columns_only() {
        let connector = accounts_connector();
        let client = FakeIngestClient::new(&[BulkJobState::JobComplete])
            .with_results(ACCOUNTS_SUCCESS, NO_FAILURES, NO_UNPROCESSED);

        let result = orchestrator(&connector, &client)
            .run(&request("public.accounts"), &CancellationToken::new())
            .await
            .unwrap();

        let uploaded = String::from_utf8(client.uploaded.lock().unwrap().clone()).unwrap();
        assert_eq!(uploaded, "name,email\nAcme,a@b.com\n");
        assert_eq!(client.calls()[0], "create:Accounts");
        assert_eq!(result.header(), ["Id", "Success", "Created", "name", "email", "Error"]);
        assert_eq!(result.data_rows().len(), 1);
        assert!(!result.has_failures());
        assert_eq!(connector.open_sessions(), 0);
    }

    #[tokio::test]
    async fn repeated_runs_agree() {
        let connector = accounts_connector();

        let mut outcomes = Vec::new();
        for _ in 0..2 {
            let client = FakeIngestClient::new(&[BulkJobState::JobComplete])
                .with_results(ACCOUNTS_SUCCESS, NO_FAILURES, NO_UNPROCESSED);
            let result = orchestrator(&connector, &client)
                .run(&request("public.accounts"), &CancellationToken::new())
                .await
                .unwrap();
            outcomes.push((result.header().to_vec(), result.data_rows().len()));
        }

        assert_eq!(outcomes[0], outcomes[1]);
    }

    #[tokio::test]
    async fn empty_table_creates_no_remote_job() {
        let connector = FakeConnector::with_table(
            "public.leads",
            FakeTable {
                columns: vec![SourceColumn::new("name", ColumnKind::Text)],
                rows: vec![],
            },
        );
        let client = FakeIngestClient::new(&[BulkJobState::JobComplete]);

        let result = orchestrator(&connector, &client)
            .run(&request("public.leads"), &CancellationToken::new())
            .await
            .unwrap();

        assert!(client.calls().is_empty());
        assert_eq!(result.header(), ["Id", "Success", "Created", "name", "Error"]);
        assert!(result.data_rows().is_empty());
        assert_eq!(connector.open_sessions(), 0);
    }

    #[tokio::test]
    async fn malformed_name_is_rejected_before_connecting() {
        let connector = accounts_connector();
        let client = FakeIngestClient::new(&[BulkJobState::JobComplete]);

        let err = orchestrator(&connector, &client)
            .run(&request("accounts"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidTableName(_)));
        assert_eq!(connector.opened.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn connection_failure_propagates() {
        let connector = FakeConnector::refusing();
        let client = FakeIngestClient::new(&[BulkJobState::JobComplete]);

        let err = orchestrator(&connector, &client)
            .run(&request("public.accounts"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ConnectionFailed(_)));
        assert!(client.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_table_closes_the_session() {
        let connector = accounts_connector();
        let client = FakeIngestClient::new(&[BulkJobState::JobComplete]);

        let err = orchestrator(&connector, &client)
            .run(&request("public.nope"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput(_)));
        assert_eq!(connector.open_sessions(), 0);
    }

    #[tokio::test]
    async fn encoding_failure_names_the_column() {
        let connector = FakeConnector::with_table(
            "public.files",
            FakeTable {
                columns: vec![
                    SourceColumn::new("name", ColumnKind::Text),
                    SourceColumn::new("body", ColumnKind::Bytes),
                ],
                rows: vec![vec![
                    SourceValue::Text("a.bin".into()),
                    SourceValue::Bytes(vec![0xc3, 0x28]),
                ]],
            },
        );
        let client = FakeIngestClient::new(&[BulkJobState::JobComplete]);

        let err = orchestrator(&connector, &client)
            .run(&request("public.files"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Encoding { ref column, .. } if column == "body"));
        assert!(client.calls().is_empty());
    }
}
