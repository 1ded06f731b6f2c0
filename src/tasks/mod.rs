//! Upload tasks: orchestration of one table upload, the worker pool that
//! bounds them, and the runner that executes them in the background.

pub mod orchestrator;
pub mod runner;
pub mod scheduler;

pub use orchestrator::{resolve_object, UploadOrchestrator, UploadRequest};
pub use runner::{HttpIngestClientFactory, IngestClientFactory, RunnerOptions, TaskRunner};
pub use scheduler::{WorkerPool, WorkerSlot};
