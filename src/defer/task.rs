//! Deferred task description, state machine, and execution results.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{DEFAULT_DELAY, DeferOptions, MAX_DELAY};
use crate::error::DeferError;
use crate::logging::{LogSink, Stream};

/// Description of one deferral. Created once per `defer` call; immutable
/// after creation.
#[derive(Debug, Clone)]
pub struct DeferredTask {
    /// Unique task ID.
    pub id: Uuid,
    /// Startup delay before the work runs.
    pub delay: Duration,
    /// Explicit disable flag, if any.
    pub disable: Option<bool>,
    /// Optional log file destination.
    pub log_path: Option<PathBuf>,
    /// When the deferral was requested.
    pub created_at: DateTime<Utc>,
}

impl DeferredTask {
    /// Validate `options` into a task. The only synchronous failure is a
    /// startup delay outside the allowed range.
    pub fn from_options(options: &DeferOptions) -> Result<Self, DeferError> {
        let delay = options.delay.unwrap_or(DEFAULT_DELAY);
        if delay > MAX_DELAY {
            return Err(DeferError::InvalidDelay {
                delay,
                max: MAX_DELAY,
            });
        }
        Ok(Self {
            id: Uuid::new_v4(),
            delay,
            disable: options.disable,
            log_path: options.log_path.clone(),
            created_at: Utc::now(),
        })
    }
}

/// State of a deferred task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// The worker is running (or waiting out its startup delay).
    Running,
    /// The unit of work finished without error.
    Completed,
    /// The unit of work raised an error or the worker panicked.
    Failed,
    /// The worker was torn down before producing a result.
    Stopped,
}

impl TaskState {
    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// A captured error, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// A diagnostic record emitted by the unit of work, in emission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub stream: Stream,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl DiagnosticRecord {
    pub fn new(stream: Stream, message: impl Into<String>) -> Self {
        Self {
            stream,
            message: message.into(),
            at: Utc::now(),
        }
    }
}

/// Produced once by the worker at termination; consumed exactly once by
/// the completion watcher.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Terminal state of the task.
    pub state: TaskState,
    /// Captured error records, in emission order.
    pub errors: Vec<ErrorRecord>,
    /// Captured diagnostic records, in emission order.
    pub diagnostics: Vec<DiagnosticRecord>,
}

impl ExecutionResult {
    /// Result for a worker that terminated without sending one.
    pub(crate) fn abnormal(state: TaskState, error: Option<String>) -> Self {
        Self {
            state,
            errors: error.map(ErrorRecord::new).into_iter().collect(),
            diagnostics: Vec::new(),
        }
    }

    /// Drain captured records into the sink: errors at error severity,
    /// diagnostics at their recorded streams.
    pub(crate) fn log_records(&self, sink: &LogSink) {
        for err in &self.errors {
            sink.error(&err.message);
        }
        for diag in &self.diagnostics {
            sink.log(diag.stream, &diag.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delay_applied() {
        let task = DeferredTask::from_options(&DeferOptions::new()).unwrap();
        assert_eq!(task.delay, DEFAULT_DELAY);
        assert_eq!(task.disable, None);
        assert!(task.log_path.is_none());
    }

    #[test]
    fn delay_bounds() {
        let ok = DeferOptions::new().with_delay(Duration::from_millis(5000));
        assert!(DeferredTask::from_options(&ok).is_ok());

        let zero = DeferOptions::new().with_delay(Duration::ZERO);
        assert!(DeferredTask::from_options(&zero).is_ok());

        let too_long = DeferOptions::new().with_delay(Duration::from_millis(5001));
        assert!(matches!(
            DeferredTask::from_options(&too_long),
            Err(DeferError::InvalidDelay { .. })
        ));
    }

    #[test]
    fn terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Stopped.is_terminal());
        assert!(!TaskState::Running.is_terminal());
    }

    #[test]
    fn state_display() {
        assert_eq!(TaskState::Completed.to_string(), "completed");
        assert_eq!(TaskState::Stopped.to_string(), "stopped");
    }

    #[test]
    fn state_serde_roundtrip() {
        let json = serde_json::to_string(&TaskState::Failed).unwrap();
        assert_eq!(json, "\"failed\"");
        let parsed: TaskState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, TaskState::Failed);
    }

    #[test]
    fn abnormal_result_carries_error() {
        let result = ExecutionResult::abnormal(TaskState::Failed, Some("boom".to_string()));
        assert_eq!(result.state, TaskState::Failed);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "boom");

        let stopped = ExecutionResult::abnormal(TaskState::Stopped, None);
        assert!(stopped.errors.is_empty());
    }
}
