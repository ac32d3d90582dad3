//! Log sink: append-only file destination plus best-effort console output.
//!
//! The sink never raises. A file destination that cannot be opened or
//! written to is disabled after a single `tracing` warning; the deferred
//! path must not fail because telemetry failed.

use std::fs::{self, File, OpenOptions};
use std::io::{IsTerminal, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Output stream category for a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Info,
    Warning,
    Error,
    Verbose,
    Debug,
}

impl Stream {
    /// Stream name as written to the file destination.
    pub fn name(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Verbose => "VERBOSE",
            Self::Debug => "DEBUG",
        }
    }

    /// ANSI color code for interactive console output.
    fn color(self) -> &'static str {
        match self {
            Self::Info => "36",    // cyan
            Self::Warning => "33", // yellow
            Self::Error => "31",   // red
            Self::Verbose => "90", // bright black
            Self::Debug => "35",   // magenta
        }
    }
}

impl std::fmt::Display for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Tagged message sink shared by the coordinator and the watcher.
pub struct LogSink {
    file: Mutex<Option<File>>,
    file_failed: AtomicBool,
}

impl LogSink {
    /// Create a sink. When `log_path` is set its parent directories are
    /// created; on failure the sink logs one warning and continues with
    /// file logging disabled.
    pub fn new(log_path: Option<&Path>) -> Self {
        let file = log_path.and_then(|path| match Self::open(path) {
            Ok(f) => Some(f),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Log file unavailable, file logging disabled"
                );
                None
            }
        });
        Self {
            file: Mutex::new(file),
            file_failed: AtomicBool::new(false),
        }
    }

    /// Sink with no file destination; console output only.
    pub fn console_only() -> Self {
        Self::new(None)
    }

    fn open(path: &Path) -> std::io::Result<File> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        OpenOptions::new().create(true).append(true).open(path)
    }

    /// Whether a file destination is currently active.
    pub fn file_enabled(&self) -> bool {
        self.file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Append one record. Never raises.
    pub fn log(&self, stream: Stream, message: &str) {
        self.write_file(stream, message);
        Self::write_console(stream, message);
    }

    pub fn info(&self, message: &str) {
        self.log(Stream::Info, message);
    }

    pub fn warning(&self, message: &str) {
        self.log(Stream::Warning, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Stream::Error, message);
    }

    pub fn verbose(&self, message: &str) {
        self.log(Stream::Verbose, message);
    }

    fn write_file(&self, stream: Stream, message: &str) {
        let mut guard = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(file) = guard.as_mut() else {
            return;
        };
        let line = format_line(stream, message);
        if let Err(e) = file.write_all(line.as_bytes()) {
            if !self.file_failed.swap(true, Ordering::SeqCst) {
                tracing::warn!(error = %e, "Log write failed, file logging disabled");
            }
            *guard = None;
        }
    }

    // Console output is best-effort and suppressed entirely when stderr is
    // not an interactive terminal, so piped output stays clean.
    fn write_console(stream: Stream, message: &str) {
        let mut out = std::io::stderr();
        if !out.is_terminal() {
            return;
        }
        let _ = writeln!(
            out,
            "\x1b[{}m[{}]\x1b[0m {}",
            stream.color(),
            stream.name(),
            message
        );
    }
}

/// One record: `<ISO-8601 timestamp> | <pid, width 6> | <STREAM, width 7> | <message>`.
fn format_line(stream: Stream, message: &str) -> String {
    format!(
        "{} | {:>6} | {:<7} | {}\n",
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        std::process::id(),
        stream.name(),
        message
    )
}
