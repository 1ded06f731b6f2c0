//! Local SQLite storage for upload tasks.

mod database;
pub mod tasks;

pub use database::Database;
pub use tasks::{DatabaseTaskStore, TaskState, TaskStore, UploadTask};
