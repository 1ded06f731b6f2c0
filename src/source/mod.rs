//! Source database access.
//!
//! The orchestrator talks to the source through two traits so it can be
//! exercised without a live database:
//!
//! - [`SourceConnector`] opens one exclusive session per upload
//! - [`SourceSession`] reads catalog metadata and rows, and must be closed
//!   explicitly with [`SourceSession::close`]
//!
//! [`postgres::PostgresConnector`] is the production implementation.

pub mod introspect;
pub mod postgres;
mod value;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use crate::error::AppError;

pub use introspect::{
    discover_tables, eligible_columns, is_eligible_column, list_columns, list_tables,
};
pub use postgres::PostgresConnector;
pub use value::{ColumnKind, SourceValue};

// ─────────────────────────────────────────────────────────────────────────────
// Table Reference
// ─────────────────────────────────────────────────────────────────────────────

/// A `schema.table` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    /// Splits a qualified name on its `.` separator.
    ///
    /// # Errors
    ///
    /// `AppError::InvalidTableName` unless the name has exactly one `.` with
    /// a non-empty part on each side.
    pub fn parse(qualified: &str) -> Result<Self, AppError> {
        let invalid = || AppError::InvalidTableName(qualified.to_string());

        let (schema, table) = qualified.split_once('.').ok_or_else(invalid)?;
        if schema.is_empty() || table.is_empty() || table.contains('.') {
            return Err(invalid());
        }

        Ok(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// A catalog column and how its values are read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceColumn {
    pub name: String,
    pub kind: ColumnKind,
}

impl SourceColumn {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// Opens sessions against a source database.
pub trait SourceConnector: Send + Sync {
    /// Opens a new, exclusive session.
    ///
    /// # Errors
    ///
    /// - `AppError::InvalidInput` - malformed connection string
    /// - `AppError::ConnectionFailed` / `AppError::SourceDatabase` - unreachable or refused
    fn connect<'a>(
        &'a self,
        connection_string: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Box<dyn SourceSession>, AppError>> + Send + 'a>>;
}

/// One open connection to the source database.
pub trait SourceSession: Send {
    /// Every `(schema, table)` pair the catalog lists.
    fn list_tables(
        &mut self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<(String, String)>, AppError>> + Send + '_>>;

    /// Every column of `table`, in catalog order, unfiltered.
    fn catalog_columns<'a>(
        &'a mut self,
        table: &'a TableRef,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SourceColumn>, AppError>> + Send + 'a>>;

    /// All rows of `table` projected onto `columns`, materialised in memory.
    fn fetch_rows<'a>(
        &'a mut self,
        table: &'a TableRef,
        columns: &'a [SourceColumn],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<SourceValue>>, AppError>> + Send + 'a>>;

    /// Releases the connection.
    fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send>>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Test Fakes
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// In-memory table: catalog columns plus rows aligned with them.
    #[derive(Debug, Clone)]
    pub(crate) struct FakeTable {
        pub columns: Vec<SourceColumn>,
        pub rows: Vec<Vec<SourceValue>>,
    }

    /// In-memory source keyed by `schema.table`.
    #[derive(Clone, Default)]
    pub(crate) struct FakeConnector {
        pub tables: Arc<HashMap<String, FakeTable>>,
        pub refuse_connections: bool,
        pub opened: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
    }

    impl FakeConnector {
        pub(crate) fn with_table(qualified: &str, table: FakeTable) -> Self {
            let mut tables = HashMap::new();
            tables.insert(qualified.to_string(), table);
            Self {
                tables: Arc::new(tables),
                ..Self::default()
            }
        }

        pub(crate) fn refusing() -> Self {
            Self {
                refuse_connections: true,
                ..Self::default()
            }
        }

        pub(crate) fn open_sessions(&self) -> usize {
            self.opened.load(Ordering::SeqCst) - self.closed.load(Ordering::SeqCst)
        }
    }

    impl SourceConnector for FakeConnector {
        fn connect<'a>(
            &'a self,
            connection_string: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Box<dyn SourceSession>, AppError>> + Send + 'a>>
        {
            Box::pin(async move {
                if self.refuse_connections {
                    return Err(AppError::ConnectionFailed(format!(
                        "could not connect to server at {}",
                        connection_string.split('@').last().unwrap_or("source")
                    )));
                }
                self.opened.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(FakeSession {
                    tables: self.tables.clone(),
                    closed: self.closed.clone(),
                }) as Box<dyn SourceSession>)
            })
        }
    }

    pub(crate) struct FakeSession {
        tables: Arc<HashMap<String, FakeTable>>,
        closed: Arc<AtomicUsize>,
    }

    impl SourceSession for FakeSession {
        fn list_tables(
            &mut self,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<(String, String)>, AppError>> + Send + '_>>
        {
            let mut names: Vec<(String, String)> = self
                .tables
                .keys()
                .filter_map(|k| k.split_once('.'))
                .map(|(s, t)| (s.to_string(), t.to_string()))
                .collect();
            names.sort();
            Box::pin(async move { Ok(names) })
        }

        fn catalog_columns<'a>(
            &'a mut self,
            table: &'a TableRef,
        ) -> Pin<Box<dyn Future<Output = Result<Vec<SourceColumn>, AppError>> + Send + 'a>>
        {
            let columns = self
                .tables
                .get(&table.to_string())
                .map(|t| t.columns.clone())
                .unwrap_or_default();
            Box::pin(async move { Ok(columns) })
        }

        fn fetch_rows<'a>(
            &'a mut self,
            table: &'a TableRef,
            columns: &'a [SourceColumn],
        ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<SourceValue>>, AppError>> + Send + 'a>>
        {
            Box::pin(async move {
                let source = self.tables.get(&table.to_string()).ok_or_else(|| {
                    AppError::SourceDatabase(format!("relation \"{}\" does not exist", table))
                })?;
                let positions: Vec<usize> = columns
                    .iter()
                    .map(|c| {
                        source
                            .columns
                            .iter()
                            .position(|sc| sc.name == c.name)
                            .ok_or_else(|| {
                                AppError::SourceDatabase(format!("column \"{}\" does not exist", c.name))
                            })
                    })
                    .collect::<Result<_, _>>()?;
                Ok(source
                    .rows
                    .iter()
                    .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
                    .collect())
            })
        }

        fn close(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<(), AppError>> + Send>> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
