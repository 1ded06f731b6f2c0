//! Catalog introspection: which tables exist and which of their columns
//! may be uploaded.

use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::error::AppError;
use crate::source::{SourceColumn, SourceConnector, SourceSession, TableRef};

/// System schemas never offered for upload.
pub const EXCLUDED_SCHEMAS: &[&str] = &["information_schema", "pg_catalog"];

/// Columns the destination manages itself (compared case-insensitively).
pub const EXCLUDED_COLUMNS: &[&str] = &["sfid", "id", "systemmodstamp", "isdeleted"];

/// True when a column may be sent to the destination.
///
/// Names starting with `_` are internal bookkeeping and never eligible.
pub fn is_eligible_column(name: &str) -> bool {
    if name.starts_with('_') {
        return false;
    }
    let lower = name.to_lowercase();
    !EXCLUDED_COLUMNS.contains(&lower.as_str())
}

/// Filters catalog columns down to the uploadable ones, keeping catalog order.
pub fn eligible_columns(catalog: Vec<SourceColumn>) -> Vec<SourceColumn> {
    catalog
        .into_iter()
        .filter(|c| is_eligible_column(&c.name))
        .collect()
}

/// Lists `schema.table` for every user table the session can see.
pub async fn list_tables(session: &mut dyn SourceSession) -> Result<Vec<String>, AppError> {
    let tables: Vec<String> = session
        .list_tables()
        .await?
        .into_iter()
        .filter(|(schema, _)| !EXCLUDED_SCHEMAS.contains(&schema.as_str()))
        .map(|(schema, table)| format!("{}.{}", schema, table))
        .collect();

    info!("[SOURCE] Catalog lists {} table(s)", tables.len());
    Ok(tables)
}

/// Opens a session, lists its tables and closes it again.
pub async fn discover_tables(
    connector: &dyn SourceConnector,
    connection_string: &SecretString,
) -> Result<Vec<String>, AppError> {
    let mut session = connector.connect(connection_string.expose_secret()).await?;
    let listed = list_tables(session.as_mut()).await;
    if let Err(e) = session.close().await {
        warn!("[SOURCE] Failed to close session after listing tables: {}", e);
    }
    listed
}

/// Eligible columns of `table` in catalog order.
///
/// An unknown table yields an empty list; the caller decides whether that is
/// an error.
pub async fn list_columns(
    session: &mut dyn SourceSession,
    table: &TableRef,
) -> Result<Vec<SourceColumn>, AppError> {
    let catalog = session.catalog_columns(table).await?;
    let total = catalog.len();
    let columns = eligible_columns(catalog);

    info!(
        "[SOURCE] {}: {} of {} column(s) eligible",
        table,
        columns.len(),
        total
    );
    Ok(columns)
}
