//! The deferred-execution coordinator: task description, worker context,
//! and the exactly-once completion watcher.

pub mod coordinator;
pub mod task;
pub mod watcher;
pub mod worker;

pub use task::{DeferredTask, DiagnosticRecord, ErrorRecord, ExecutionResult, TaskState};
pub use worker::{DeferredWork, WorkerHandle, WorkerScope};
