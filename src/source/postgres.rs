// =====================================================
// POSTGRESQL SOURCE CONNECTOR
// =====================================================

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::{Connection, Row};
use tracing::{debug, info};

use crate::error::AppError;
use crate::source::{ColumnKind, SourceColumn, SourceConnector, SourceSession, SourceValue, TableRef};

const LIST_TABLES_SQL: &str = "\
    SELECT table_schema::text AS table_schema, table_name::text AS table_name \
    FROM information_schema.tables \
    WHERE table_schema NOT IN ('information_schema', 'pg_catalog') \
    ORDER BY table_schema, table_name";

const LIST_COLUMNS_SQL: &str = "\
    SELECT column_name::text AS column_name, data_type::text AS data_type, \
           domain_name::text AS domain_name \
    FROM information_schema.columns \
    WHERE table_schema = $1 AND table_name = $2 \
    ORDER BY ordinal_position";

fn quote_identifier_postgres(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Select-list entry for one column. Kinds without a native decoder are
/// cast to text on the server.
fn select_expression(column: &SourceColumn) -> String {
    let quoted = quote_identifier_postgres(&column.name);
    match column.kind {
        ColumnKind::Text => format!("{q}::text AS {q}", q = quoted),
        _ => quoted,
    }
}

fn select_rows_sql(table: &TableRef, columns: &[SourceColumn]) -> String {
    let projection = columns
        .iter()
        .map(select_expression)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT {} FROM {}.{}",
        projection,
        quote_identifier_postgres(&table.schema),
        quote_identifier_postgres(&table.table)
    )
}

fn decode_value(row: &PgRow, idx: usize, column: &SourceColumn) -> Result<SourceValue, AppError> {
    fn get<'r, T>(row: &'r PgRow, idx: usize, column: &SourceColumn) -> Result<Option<T>, AppError>
    where
        T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
    {
        row.try_get::<Option<T>, _>(idx).map_err(|e| {
            AppError::SourceDatabase(format!("Failed to read column '{}': {}", column.name, e))
        })
    }

    let value = match column.kind {
        ColumnKind::Bool => get::<bool>(row, idx, column)?.map(SourceValue::Bool),
        ColumnKind::SmallInt => get::<i16>(row, idx, column)?.map(|v| SourceValue::Int(v.into())),
        ColumnKind::Integer => get::<i32>(row, idx, column)?.map(|v| SourceValue::Int(v.into())),
        ColumnKind::BigInt => get::<i64>(row, idx, column)?.map(SourceValue::Int),
        ColumnKind::Real => get::<f32>(row, idx, column)?.map(SourceValue::Float32),
        ColumnKind::Double => get::<f64>(row, idx, column)?.map(SourceValue::Float),
        ColumnKind::Date => get::<NaiveDate>(row, idx, column)?.map(SourceValue::Date),
        ColumnKind::Time => get::<NaiveTime>(row, idx, column)?.map(SourceValue::Time),
        ColumnKind::Timestamp => get::<NaiveDateTime>(row, idx, column)?.map(SourceValue::Timestamp),
        ColumnKind::TimestampTz => {
            get::<DateTime<Utc>>(row, idx, column)?.map(SourceValue::TimestampTz)
        }
        ColumnKind::Bytes => get::<Vec<u8>>(row, idx, column)?.map(SourceValue::Bytes),
        ColumnKind::Text => get::<String>(row, idx, column)?.map(SourceValue::Text),
    };
    Ok(value.unwrap_or(SourceValue::Null))
}

/// Opens one `PgConnection` per session from a `postgres://` URL.
#[derive(Debug, Clone, Default)]
pub struct PostgresConnector;

impl PostgresConnector {
    pub fn new() -> Self {
        Self
    }
}

impl SourceConnector for PostgresConnector {
    fn connect<'a>(
        &'a self,
        connection_string: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn SourceSession>, AppError>> + Send + 'a>> {
        Box::pin(async move {
            let conn = PgConnection::connect(connection_string).await?;
            debug!("[SOURCE] Connection opened");
            Ok(Box::new(PostgresSession { conn }) as Box<dyn SourceSession>)
        })
    }
}

struct PostgresSession {
    conn: PgConnection,
}

impl SourceSession for PostgresSession {
    fn list_tables(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<(String, String)>, AppError>> + Send + '_>> {
        Box::pin(async move {
            let rows = sqlx::query(LIST_TABLES_SQL).fetch_all(&mut self.conn).await?;
            rows.iter()
                .map(|row| {
                    Ok((
                        row.try_get::<String, _>("table_schema")?,
                        row.try_get::<String, _>("table_name")?,
                    ))
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()
                .map_err(AppError::from)
        })
    }

    fn catalog_columns<'a>(
        &'a mut self,
        table: &'a TableRef,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SourceColumn>, AppError>> + Send + 'a>> {
        Box::pin(async move {
            let rows = sqlx::query(LIST_COLUMNS_SQL)
                .bind(&table.schema)
                .bind(&table.table)
                .fetch_all(&mut self.conn)
                .await?;
            rows.iter()
                .map(|row| {
                    let name: String = row.try_get("column_name")?;
                    let data_type: String = row.try_get("data_type")?;
                    let domain: Option<String> = row.try_get("domain_name")?;
                    Ok(SourceColumn::new(
                        name,
                        ColumnKind::from_catalog(&data_type, domain.as_deref()),
                    ))
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()
                .map_err(AppError::from)
        })
    }

    fn fetch_rows<'a>(
        &'a mut self,
        table: &'a TableRef,
        columns: &'a [SourceColumn],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<SourceValue>>, AppError>> + Send + 'a>> {
        Box::pin(async move {
            if columns.is_empty() {
                return Err(AppError::Internal(format!(
                    "No columns to select from {}",
                    table
                )));
            }

            let sql = select_rows_sql(table, columns);
            let rows = sqlx::query(&sql).fetch_all(&mut self.conn).await?;

            let values = rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .enumerate()
                        .map(|(idx, column)| decode_value(row, idx, column))
                        .collect::<Result<Vec<_>, _>>()
                })
                .collect::<Result<Vec<_>, _>>()?;

            info!("[SOURCE] Read {} row(s) from {}", values.len(), table);
            Ok(values)
        })
    }

    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send>> {
        Box::pin(async move {
            self.conn.close().await?;
            debug!("[SOURCE] Connection closed");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_identifier_postgres("name"), "\"name\"");
        assert_eq!(quote_identifier_postgres("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn builds_projection_with_text_casts() {
        let table = TableRef::parse("public.accounts").unwrap();
        let columns = vec![
            SourceColumn::new("name", ColumnKind::Text),
            SourceColumn::new("created", ColumnKind::Timestamp),
            SourceColumn::new("Balance", ColumnKind::Text),
        ];
        assert_eq!(
            select_rows_sql(&table, &columns),
            "SELECT \"name\"::text AS \"name\", \"created\", \"Balance\"::text AS \"Balance\" \
             FROM \"public\".\"accounts\""
        );
    }

    #[test]
    fn domain_columns_are_cast_to_text() {
        let qty = SourceColumn::new("qty", ColumnKind::from_catalog("integer", Some("qty")));
        let count = SourceColumn::new("count", ColumnKind::from_catalog("integer", None));
        assert_eq!(select_expression(&qty), "\"qty\"::text AS \"qty\"");
        assert_eq!(select_expression(&count), "\"count\"");
    }

    #[tokio::test]
    async fn malformed_connection_string_is_an_error() {
        let connector = PostgresConnector::new();
        let result = connector.connect("not a url").await;
        assert!(result.is_err());
    }
}
