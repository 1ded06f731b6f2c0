use chrono::{NaiveDateTime, NaiveTime, SecondsFormat, Timelike};

use crate::error::AppError;
use crate::source::{SourceColumn, SourceValue};

/// Encodes one source value as a CSV field.
///
/// Temporal values become ISO-8601 text, NULL becomes the empty string and
/// everything else its text form. Byte values must be valid UTF-8.
///
/// # Errors
///
/// `AppError::Encoding` (with an empty column name) when a byte value is not
/// valid UTF-8. [`encode_row`] fills in the column.
pub fn encode_value(value: &SourceValue) -> Result<String, AppError> {
    let encoded = match value {
        SourceValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        SourceValue::Time(t) => format_time(t),
        SourceValue::Timestamp(ts) => format_timestamp(ts),
        SourceValue::TimestampTz(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, false),
        SourceValue::Null => String::new(),
        SourceValue::Bool(b) => b.to_string(),
        SourceValue::Int(i) => i.to_string(),
        SourceValue::Float32(f) => f.to_string(),
        SourceValue::Float(f) => f.to_string(),
        SourceValue::Text(s) => s.clone(),
        SourceValue::Bytes(bytes) => std::str::from_utf8(bytes)
            .map_err(|e| AppError::Encoding {
                column: String::new(),
                message: e.to_string(),
            })?
            .to_string(),
    };
    Ok(encoded)
}

/// Encodes a row aligned with `columns`.
///
/// # Errors
///
/// - `AppError::Encoding` naming the first column that cannot be encoded
/// - `AppError::Internal` when the row and column list lengths differ
pub fn encode_row(columns: &[SourceColumn], values: &[SourceValue]) -> Result<Vec<String>, AppError> {
    if columns.len() != values.len() {
        return Err(AppError::Internal(format!(
            "Row has {} value(s) for {} column(s)",
            values.len(),
            columns.len()
        )));
    }

    columns
        .iter()
        .zip(values)
        .map(|(column, value)| {
            encode_value(value).map_err(|e| match e {
                AppError::Encoding { message, .. } => AppError::Encoding {
                    column: column.name.clone(),
                    message,
                },
                other => other,
            })
        })
        .collect()
}

// Fractional seconds only when present, at microsecond precision.
fn format_time(t: &NaiveTime) -> String {
    if t.nanosecond() == 0 {
        t.format("%H:%M:%S").to_string()
    } else {
        t.format("%H:%M:%S%.6f").to_string()
    }
}

fn format_timestamp(ts: &NaiveDateTime) -> String {
    if ts.nanosecond() == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ColumnKind;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn temporal_values_are_iso_8601() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(encode_value(&SourceValue::Date(date)).unwrap(), "2024-03-09");

        let ts = date.and_hms_opt(14, 5, 0).unwrap();
        assert_eq!(
            encode_value(&SourceValue::Timestamp(ts)).unwrap(),
            "2024-03-09T14:05:00"
        );

        let precise = date.and_hms_micro_opt(14, 5, 0, 250).unwrap();
        assert_eq!(
            encode_value(&SourceValue::Timestamp(precise)).unwrap(),
            "2024-03-09T14:05:00.000250"
        );

        let time = NaiveTime::from_hms_opt(8, 30, 15).unwrap();
        assert_eq!(encode_value(&SourceValue::Time(time)).unwrap(), "08:30:15");

        let utc = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap();
        assert_eq!(
            encode_value(&SourceValue::TimestampTz(utc)).unwrap(),
            "2024-03-09T14:05:00+00:00"
        );
    }

    #[test]
    fn null_is_empty() {
        assert_eq!(encode_value(&SourceValue::Null).unwrap(), "");
    }

    #[test]
    fn scalars_use_their_text_form() {
        assert_eq!(encode_value(&SourceValue::Bool(true)).unwrap(), "true");
        assert_eq!(encode_value(&SourceValue::Int(-42)).unwrap(), "-42");
        assert_eq!(encode_value(&SourceValue::Float(1.5)).unwrap(), "1.5");
        assert_eq!(encode_value(&SourceValue::Float(0.1)).unwrap(), "0.1");
        assert_eq!(
            encode_value(&SourceValue::Text("Zoë, \"Ltd\"".into())).unwrap(),
            "Zoë, \"Ltd\""
        );
        assert_eq!(
            encode_value(&SourceValue::Bytes("héllo".as_bytes().to_vec())).unwrap(),
            "héllo"
        );
    }

    #[test]
    fn invalid_utf8_names_the_column() {
        let columns = vec![
            SourceColumn::new("name", ColumnKind::Text),
            SourceColumn::new("blob", ColumnKind::Bytes),
        ];
        let values = vec![
            SourceValue::Text("Acme".into()),
            SourceValue::Bytes(vec![0xff, 0xfe]),
        ];

        let err = encode_row(&columns, &values).unwrap_err();
        match err {
            AppError::Encoding { column, .. } => assert_eq!(column, "blob"),
            other => panic!("expected Encoding, got {:?}", other),
        }
    }

    #[test]
    fn encodes_aligned_row() {
        let columns = vec![
            SourceColumn::new("name", ColumnKind::Text),
            SourceColumn::new("email", ColumnKind::Text),
            SourceColumn::new("score", ColumnKind::Integer),
        ];
        let values = vec![
            SourceValue::Text("Acme".into()),
            SourceValue::Null,
            SourceValue::Int(7),
        ];
        assert_eq!(encode_row(&columns, &values).unwrap(), vec!["Acme", "", "7"]);
    }

    #[test]
    fn length_mismatch_is_internal() {
        let columns = vec![SourceColumn::new("name", ColumnKind::Text)];
        let err = encode_row(&columns, &[]).unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
    }

    #[test]
    fn real_values_keep_their_stored_text() {
        assert_eq!(encode_value(&SourceValue::Float32(0.1)).unwrap(), "0.1");
        assert_eq!(encode_value(&SourceValue::Float32(19.99)).unwrap(), "19.99");
        assert_eq!(encode_value(&SourceValue::Float32(-3.0)).unwrap(), "-3");
    }
}
