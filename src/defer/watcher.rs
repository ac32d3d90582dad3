//! Completion watcher: exactly-once terminal handling and guaranteed
//! teardown for one worker.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::defer::task::{ExecutionResult, TaskState};
use crate::defer::worker::WorkerHandle;
use crate::logging::LogSink;
use crate::session::namespace::Session;

/// Observes a worker's lifecycle and handles its terminal state exactly
/// once. Delivery is structurally at-most-once (the completion channel is
/// a oneshot) and at-least-once (a dropped sender is still observed and
/// mapped to a terminal state through the join handle).
pub struct CompletionWatcher;

impl CompletionWatcher {
    /// Arm the watcher for `handle`. The returned task fires once on
    /// terminal state: drains captured records into the sink, merges
    /// worker-registered session extensions, and releases the worker
    /// context unconditionally.
    pub(crate) fn arm(
        mut handle: WorkerHandle,
        session: Session,
        sink: Arc<LogSink>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let result = Self::await_result(&mut handle).await;
            Self::settle(&handle, &session, &sink, &result);
            // Teardown runs regardless of what settling did; the handle's
            // Drop impl backstops this path.
            handle.dispose();
        })
    }

    /// Wait for the worker's terminal result. A closed channel means the
    /// worker never got to send: a panic maps to Failed, anything else
    /// (abort, runtime shutdown) to Stopped.
    async fn await_result(handle: &mut WorkerHandle) -> ExecutionResult {
        let Some(rx) = handle.take_result_rx() else {
            return ExecutionResult::abnormal(TaskState::Stopped, None);
        };
        match rx.await {
            Ok(result) => result,
            Err(_) => match handle.take_join() {
                Some(join) => match join.await {
                    Ok(()) => ExecutionResult::abnormal(TaskState::Stopped, None),
                    Err(e) if e.is_panic() => ExecutionResult::abnormal(
                        TaskState::Failed,
                        Some(format!("Worker panicked: {e}")),
                    ),
                    Err(_) => ExecutionResult::abnormal(TaskState::Stopped, None),
                },
                None => ExecutionResult::abnormal(TaskState::Stopped, None),
            },
        }
    }

    /// Drain records, merge session-wide side effects, and emit the final
    /// marker. Every step here is non-raising; teardown is never skipped.
    fn settle(handle: &WorkerHandle, session: &Session, sink: &LogSink, result: &ExecutionResult) {
        result.log_records(sink);

        let extensions = handle.take_extensions();
        if !extensions.is_empty() {
            sink.verbose(&format!(
                "Merged {} session extension(s) from worker",
                extensions.len()
            ));
            session.merge_extensions(extensions);
        }

        let elapsed_ms = handle.elapsed().as_millis();
        sink.info(&format!(
            "Deferred load finished: task={} state={} elapsed={}ms",
            handle.task_id(),
            result.state,
            elapsed_ms
        ));
        tracing::debug!(
            task = %handle.task_id(),
            state = %result.state,
            elapsed_ms = elapsed_ms as u64,
            "deferred load finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    use crate::config::DeferOptions;
    use crate::defer::task::DeferredTask;
    use crate::error::WorkError;
    use crate::logging::Stream;
    use crate::session::namespace::{ExtensionKind, SessionExtension};

    fn spawn_worker(
        session: &Session,
        work: crate::defer::worker::DeferredWork,
    ) -> WorkerHandle {
        let task = DeferredTask::from_options(
            &DeferOptions::new().with_delay(Duration::from_millis(0)),
        )
        .unwrap();
        WorkerHandle::spawn(&task, session.snapshot(), work)
    }

    #[tokio::test]
    async fn watcher_merges_extensions_and_tears_down() {
        let session = Session::new();
        let handle = spawn_worker(
            &session,
            Box::new(|scope| {
                scope.namespace().set_var("answer", json!(42));
                scope.register_extension(SessionExtension::new(
                    "watcher-test-format",
                    ExtensionKind::Format,
                ));
                Ok(())
            }),
        );

        let sink = Arc::new(LogSink::console_only());
        CompletionWatcher::arm(handle, session.clone(), sink)
            .await
            .unwrap();

        assert_eq!(session.namespace().var("answer"), Some(json!(42)));
        assert!(
            session
                .extensions()
                .iter()
                .any(|e| e.name == "watcher-test-format")
        );
    }

    #[tokio::test]
    async fn watcher_logs_errors_and_diagnostics_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.log");
        let session = Session::new();
        let handle = spawn_worker(
            &session,
            Box::new(|scope| {
                scope.log(Stream::Info, "partial progress");
                Err(WorkError::msg("load step exploded"))
            }),
        );

        let sink = Arc::new(LogSink::new(Some(&path)));
        CompletionWatcher::arm(handle, session, sink).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("load step exploded"));
        assert!(contents.contains("partial progress"));
        assert!(contents.contains("state=failed"));
    }

    #[tokio::test]
    async fn worker_panic_maps_to_failed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panic.log");
        let session = Session::new();
        let handle = spawn_worker(&session, Box::new(|_| panic!("kaboom")));

        let sink = Arc::new(LogSink::new(Some(&path)));
        CompletionWatcher::arm(handle, session, sink).await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("state=failed"));
        assert!(contents.contains("Worker panicked"));
    }
}
