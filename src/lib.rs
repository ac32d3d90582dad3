//! defer-load — deferred session initialization.
//!
//! Defers a caller-supplied unit of work onto a background worker so the
//! foreground session resumes immediately, while the deferred work still
//! executes as if it had run inline: variables, functions, aliases, and
//! dynamically registered completions land in the caller's environment
//! once the work finishes.
//!
//! ```no_run
//! use defer_load::{DeferOptions, Session};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), defer_load::DeferError> {
//! let session = Session::new();
//! session.defer(
//!     Box::new(|scope| {
//!         scope.namespace().set_var("expensive_module", json!({"loaded": true}));
//!         Ok(())
//!     }),
//!     DeferOptions::new(),
//! )?;
//! // Returns immediately; bindings appear after the startup delay.
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod defer;
pub mod error;
pub mod logging;
pub mod session;

pub use config::{DISABLE_ENV_VAR, DeferOptions};
pub use defer::task::{DeferredTask, DiagnosticRecord, ErrorRecord, ExecutionResult, TaskState};
pub use defer::worker::{DeferredWork, WorkerHandle, WorkerScope};
pub use error::{DeferError, Error, Result, WorkError};
pub use logging::{LogSink, Stream};
pub use session::completion::{ArgumentCompleter, CompletionRegistry};
pub use session::namespace::{
    ExtensionKind, Namespace, Session, SessionExtension, SessionFn, SessionSnapshot,
};
