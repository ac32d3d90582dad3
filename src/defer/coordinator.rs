//! Entry point: build the snapshot, start the worker, arm the watcher,
//! return to the caller immediately.

use std::sync::Arc;

use crate::config::{self, DeferOptions};
use crate::defer::task::DeferredTask;
use crate::defer::watcher::CompletionWatcher;
use crate::defer::worker::{self, DeferredWork, WorkerEnvironment, WorkerHandle};
use crate::error::DeferError;
use crate::logging::LogSink;
use crate::session::namespace::Session;

impl Session {
    /// Defer `work` onto a background worker and return immediately.
    ///
    /// The work runs once, after the configured startup delay, against this
    /// session's namespace; bindings it creates become visible to the
    /// caller, and errors it raises are captured and logged rather than
    /// propagated. When deferral is disabled — by an explicit option or by
    /// the `DEFER_LOAD_DISABLE` environment variable — the work runs
    /// synchronously in the caller's context instead and no worker is
    /// created.
    ///
    /// Fails synchronously only for invalid construction input: a startup
    /// delay outside 0..=5000ms. Requires a tokio runtime unless disabled.
    pub fn defer(&self, work: DeferredWork, options: DeferOptions) -> Result<(), DeferError> {
        let task = DeferredTask::from_options(&options)?;
        let sink = Arc::new(LogSink::new(task.log_path.as_deref()));

        if config::disable_resolved(task.disable) {
            self.run_inline(work, &task, &sink);
            return Ok(());
        }

        let handle = WorkerHandle::spawn(&task, self.snapshot(), work);
        CompletionWatcher::arm(handle, self.clone(), Arc::clone(&sink));

        sink.info(&format!(
            "Deferred load started: task={} delay={}ms",
            task.id,
            task.delay.as_millis()
        ));
        tracing::debug!(
            task = %task.id,
            delay_ms = task.delay.as_millis() as u64,
            "deferred load started"
        );
        Ok(())
    }

    /// Escape hatch for environments where deferral is unsafe: run the
    /// work in the caller's own context with the same capture-and-log
    /// error semantics as the deferred path.
    fn run_inline(&self, work: DeferredWork, task: &DeferredTask, sink: &LogSink) {
        let env = Arc::new(WorkerEnvironment::default());
        let state = worker::run_wrapper(self.snapshot(), work, &env);
        let result = env.drain(state);
        result.log_records(sink);
        self.merge_extensions(env.take_extensions());

        sink.info(&format!(
            "Deferred load ran synchronously: task={} state={}",
            task.id, result.state
        ));
        tracing::debug!(task = %task.id, state = %result.state, "deferred load ran synchronously");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    use crate::error::WorkError;
    use crate::session::namespace::{ExtensionKind, SessionExtension};

    #[test]
    fn invalid_delay_fails_synchronously() {
        let session = Session::new();
        let result = session.defer(
            Box::new(|_| Ok(())),
            DeferOptions::new().with_delay(Duration::from_millis(6000)),
        );
        assert!(matches!(result, Err(DeferError::InvalidDelay { .. })));
    }

    // Plain #[test]: the disabled path must not need a runtime, because it
    // never spawns a background context.
    #[test]
    fn disabled_runs_in_caller_context() {
        let session = Session::new();
        session
            .defer(
                Box::new(|scope| {
                    scope.namespace().set_var("inline", json!("yes"));
                    Ok(())
                }),
                DeferOptions::new().with_disable(true),
            )
            .unwrap();

        // Effects are visible the moment defer returns.
        assert_eq!(session.namespace().var("inline"), Some(json!("yes")));
    }

    #[test]
    fn disabled_path_captures_work_errors() {
        let session = Session::new();
        let result = session.defer(
            Box::new(|scope| {
                scope.namespace().set_var("before_failure", json!(1));
                Err(WorkError::msg("inline failure"))
            }),
            DeferOptions::new().with_disable(true),
        );

        // The work failed but the caller's control flow is unaffected.
        assert!(result.is_ok());
        assert_eq!(session.namespace().var("before_failure"), Some(json!(1)));
    }

    #[test]
    fn disabled_path_merges_extensions_immediately() {
        let session = Session::new();
        session
            .defer(
                Box::new(|scope| {
                    scope.register_extension(SessionExtension::new(
                        "coordinator-test-type",
                        ExtensionKind::Type,
                    ));
                    Ok(())
                }),
                DeferOptions::new().with_disable(true),
            )
            .unwrap();

        assert!(
            session
                .extensions()
                .iter()
                .any(|e| e.name == "coordinator-test-type")
        );
    }
}
