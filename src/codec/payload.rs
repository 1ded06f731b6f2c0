//! CSV payload for a single ingest upload.

use csv::{Terminator, WriterBuilder};

use crate::error::AppError;

/// Largest payload accepted for one ingest job (100 MB).
pub const MAX_PAYLOAD_BYTES: usize = 100 * 1024 * 1024;

/// An encoded CSV document ready for `upload_job_data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvPayload {
    pub bytes: Vec<u8>,
    /// Data records, excluding the header.
    pub record_count: usize,
}

/// Writes `header` followed by `rows` as CSV with LF line endings.
///
/// Fields are quoted only when needed.
///
/// # Errors
///
/// `AppError::CsvInvalid` when a row's width differs from the header's, or
/// when the document exceeds [`MAX_PAYLOAD_BYTES`].
pub fn build_csv_payload(header: &[String], rows: &[Vec<String>]) -> Result<CsvPayload, AppError> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer
        .write_record(header)
        .map_err(|e| AppError::CsvInvalid(format!("Failed to write header: {}", e)))?;

    for (idx, row) in rows.iter().enumerate() {
        if row.len() != header.len() {
            return Err(AppError::CsvInvalid(format!(
                "Record {} has {} field(s), expected {}",
                idx + 1,
                row.len(),
                header.len()
            )));
        }
        writer
            .write_record(row)
            .map_err(|e| AppError::CsvInvalid(format!("Failed to write record {}: {}", idx + 1, e)))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::CsvInvalid(format!("Failed to flush CSV: {}", e)))?;

    if bytes.len() > MAX_PAYLOAD_BYTES {
        return Err(AppError::CsvInvalid(format!(
            "Payload is {} bytes; a single upload is limited to {} bytes",
            bytes.len(),
            MAX_PAYLOAD_BYTES
        )));
    }

    Ok(CsvPayload {
        bytes,
        record_count: rows.len(),
    })
}
