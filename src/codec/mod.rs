//! Row encoding and CSV payload assembly for uploads.

pub mod payload;
pub mod row;

pub use payload::{build_csv_payload, CsvPayload};
pub use row::{encode_row, encode_value};
