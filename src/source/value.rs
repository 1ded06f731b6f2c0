//! Closed set of source value kinds, resolved from the catalog type.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// How a column's values are read from the source database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Bool,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Bytes,
    /// Anything else; selected as `::text`.
    Text,
}

impl ColumnKind {
    /// Maps an `information_schema.columns.data_type` value to a kind.
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type.trim().to_ascii_lowercase().as_str() {
            "boolean" => ColumnKind::Bool,
            "smallint" => ColumnKind::SmallInt,
            "integer" => ColumnKind::Integer,
            "bigint" => ColumnKind::BigInt,
            "real" => ColumnKind::Real,
            "double precision" => ColumnKind::Double,
            "date" => ColumnKind::Date,
            "time without time zone" => ColumnKind::Time,
            "timestamp without time zone" => ColumnKind::Timestamp,
            "timestamp with time zone" => ColumnKind::TimestampTz,
            "bytea" => ColumnKind::Bytes,
            _ => ColumnKind::Text,
        }
    }

    /// Kind of a catalog column. Domain-typed columns report their base type
    /// in `data_type` but do not decode as it, so they are read as text.
    pub fn from_catalog(data_type: &str, domain_name: Option<&str>) -> Self {
        match domain_name {
            Some(domain) if !domain.trim().is_empty() => ColumnKind::Text,
            _ => Self::from_data_type(data_type),
        }
    }
}

/// One value read from a source row.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Null,
    Bool(bool),
    Int(i64),
    /// `real`; kept single precision so its text form is the stored one.
    Float32(f32),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}
