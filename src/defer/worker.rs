//! Worker context: the isolated environment that runs the deferred-work
//! wrapper off the caller's task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::defer::task::{
    DeferredTask, DiagnosticRecord, ErrorRecord, ExecutionResult, TaskState,
};
use crate::error::WorkError;
use crate::logging::Stream;
use crate::session::completion::CompletionRegistry;
use crate::session::namespace::{Namespace, SessionExtension, SessionSnapshot};

/// The caller-supplied unit of work. Runs once, off the caller's task,
/// against the shared session namespace.
pub type DeferredWork = Box<dyn FnOnce(&WorkerScope) -> Result<(), WorkError> + Send + 'static>;

/// The unit of work's view of its execution environment.
///
/// Namespace bindings go straight to the caller's namespace and completion
/// registrations to the process-wide registry — both are shared, not
/// copied. Diagnostics, non-fatal errors, and session extensions are
/// buffered in the worker environment and drained by the completion
/// watcher once the task reaches a terminal state.
pub struct WorkerScope {
    snapshot: SessionSnapshot,
    env: Arc<WorkerEnvironment>,
}

impl WorkerScope {
    pub(crate) fn new(snapshot: SessionSnapshot, env: Arc<WorkerEnvironment>) -> Self {
        Self { snapshot, env }
    }

    /// The caller's namespace.
    pub fn namespace(&self) -> &Namespace {
        self.snapshot.namespace()
    }

    /// The process-wide completion registry.
    pub fn completions(&self) -> &'static CompletionRegistry {
        self.snapshot.completions()
    }

    /// Emit a diagnostic record, surfaced once the watcher drains the
    /// execution result.
    pub fn log(&self, stream: Stream, message: impl Into<String>) {
        self.env.record_diagnostic(DiagnosticRecord::new(stream, message));
    }

    /// Record a non-fatal error without terminating the work.
    pub fn record_error(&self, message: impl Into<String>) {
        self.env.record_error(ErrorRecord::new(message));
    }

    /// Register a session-wide extension, merged into the caller's session
    /// on completion.
    pub fn register_extension(&self, ext: SessionExtension) {
        self.env.record_extension(ext);
    }
}

/// Worker-scoped mutable state, isolated from the caller until drained.
#[derive(Default)]
pub(crate) struct WorkerEnvironment {
    errors: Mutex<Vec<ErrorRecord>>,
    diagnostics: Mutex<Vec<DiagnosticRecord>>,
    extensions: Mutex<Vec<SessionExtension>>,
}

impl WorkerEnvironment {
    pub(crate) fn record_error(&self, record: ErrorRecord) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    fn record_diagnostic(&self, record: DiagnosticRecord) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    fn record_extension(&self, ext: SessionExtension) {
        self.extensions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ext);
    }

    /// Take the buffered extensions, leaving the table empty so a second
    /// drain merges nothing.
    pub(crate) fn take_extensions(&self) -> Vec<SessionExtension> {
        std::mem::take(
            &mut *self
                .extensions
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    /// Produce the terminal result, clearing the record buffers so nothing
    /// is re-reported.
    pub(crate) fn drain(&self, state: TaskState) -> ExecutionResult {
        ExecutionResult {
            state,
            errors: std::mem::take(
                &mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner),
            ),
            diagnostics: std::mem::take(
                &mut *self
                    .diagnostics
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            ),
        }
    }
}

/// Run the deferred-work wrapper against `env`: execute the work, capture
/// a terminal error if it raises, and release the work closure and
/// snapshot handle before completion is signalled so neither leaks into
/// caller-visible state.
pub(crate) fn run_wrapper(
    snapshot: SessionSnapshot,
    work: DeferredWork,
    env: &Arc<WorkerEnvironment>,
) -> TaskState {
    let scope = WorkerScope::new(snapshot, Arc::clone(env));
    let state = match work(&scope) {
        Ok(()) => TaskState::Completed,
        Err(e) => {
            env.record_error(ErrorRecord::new(e.to_string()));
            TaskState::Failed
        }
    };
    drop(scope);
    state
}

/// Owns the isolated worker context backing one deferred task: the spawned
/// task, the receiving half of its one-shot completion channel, and the
/// worker-scoped environment. Exactly one per [`DeferredTask`].
pub struct WorkerHandle {
    task_id: Uuid,
    started_at: Instant,
    join: Option<JoinHandle<()>>,
    result_rx: Option<oneshot::Receiver<ExecutionResult>>,
    env: Arc<WorkerEnvironment>,
    disposed: AtomicBool,
}

impl WorkerHandle {
    /// Spawn the worker for `task`: wait out the startup delay, run the
    /// work against the shared namespace, then send exactly one terminal
    /// result over the completion channel.
    pub(crate) fn spawn(task: &DeferredTask, snapshot: SessionSnapshot, work: DeferredWork) -> Self {
        let env = Arc::new(WorkerEnvironment::default());
        let (result_tx, result_rx) = oneshot::channel();
        let delay = task.delay;
        let worker_env = Arc::clone(&env);

        let join = tokio::spawn(async move {
            // The caller's own startup (line editing, completion init) may
            // not be safe to race against; the delay is a pragmatic
            // mitigation, not a correctness proof.
            tokio::time::sleep(delay).await;

            let state = run_wrapper(snapshot, work, &worker_env);

            // Receiver gone means the watcher was torn down first; nothing
            // left to notify.
            let _ = result_tx.send(worker_env.drain(state));
        });

        Self {
            task_id: task.id,
            started_at: Instant::now(),
            join: Some(join),
            result_rx: Some(result_rx),
            env,
            disposed: AtomicBool::new(false),
        }
    }

    /// ID of the task this worker backs.
    pub fn task_id(&self) -> Uuid {
        self.task_id
    }

    /// Time since the worker was started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether the handle's resources have been released.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Take the receiving half of the completion channel. Yields `Some`
    /// exactly once.
    pub(crate) fn take_result_rx(&mut self) -> Option<oneshot::Receiver<ExecutionResult>> {
        self.result_rx.take()
    }

    /// Take the worker task's join handle, if not already consumed.
    pub(crate) fn take_join(&mut self) -> Option<JoinHandle<()>> {
        self.join.take()
    }

    /// Extensions the worker registered in its isolated environment.
    pub(crate) fn take_extensions(&self) -> Vec<SessionExtension> {
        self.env.take_extensions()
    }

    /// Release the worker context. Idempotent: disposing an
    /// already-disposed handle is a no-op, not an error.
    pub fn dispose(&mut self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(join) = self.join.take() {
            if !join.is_finished() {
                join.abort();
            }
        }
        self.result_rx.take();
        tracing::debug!(task = %self.task_id, "worker context released");
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.dispose();
    }
}
