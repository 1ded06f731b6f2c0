//! Uploads relational tables into Salesforce objects through Bulk API v2.
//!
//! A table is read from the source database, encoded as one CSV payload and
//! sent as a single ingest batch. Uploads run as background tasks whose
//! state and per-row results are kept in a local SQLite store.

pub mod codec;
pub mod config;
pub mod error;
pub mod render;
pub mod salesforce;
pub mod server;
pub mod source;
pub mod state;
pub mod storage;
pub mod tasks;
