//! Deferral options and the environment override.

use std::path::PathBuf;
use std::time::Duration;

/// Environment variable forcing synchronous execution.
///
/// Recognized truthy values are `1`, `true`, and `yes`, case-insensitive.
/// An explicit [`DeferOptions::disable`] setting takes precedence.
pub const DISABLE_ENV_VAR: &str = "DEFER_LOAD_DISABLE";

/// Default startup delay before the deferred work runs.
pub const DEFAULT_DELAY: Duration = Duration::from_millis(500);

/// Maximum allowed startup delay.
pub const MAX_DELAY: Duration = Duration::from_millis(5000);

/// Options for a single deferral.
#[derive(Debug, Clone, Default)]
pub struct DeferOptions {
    /// Startup delay before the work runs (default 500ms, max 5000ms).
    pub delay: Option<Duration>,
    /// Explicit disable flag; `Some(_)` wins over the environment variable.
    pub disable: Option<bool>,
    /// Optional log file destination (parent directories are created).
    pub log_path: Option<PathBuf>,
}

impl DeferOptions {
    /// Create options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the startup delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Explicitly enable or disable deferral, overriding the environment.
    pub fn with_disable(mut self, disable: bool) -> Self {
        self.disable = Some(disable);
        self
    }

    /// Set the log file destination.
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }
}

/// True when `value` spells a recognized truthy override.
pub(crate) fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

/// Resolve the deferral mode once at entry: an explicit flag wins, otherwise
/// the environment variable is consulted.
pub(crate) fn disable_resolved(explicit: Option<bool>) -> bool {
    if let Some(flag) = explicit {
        return flag;
    }
    std::env::var(DISABLE_ENV_VAR)
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("true"));
        assert!(is_truthy("TRUE"));
        assert!(is_truthy("Yes"));
        assert!(is_truthy(" yes "));
    }

    #[test]
    fn falsy_values() {
        assert!(!is_truthy(""));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("false"));
        assert!(!is_truthy("no"));
        assert!(!is_truthy("on"));
    }

    #[test]
    fn options_builder() {
        let opts = DeferOptions::new()
            .with_delay(Duration::from_millis(100))
            .with_disable(true)
            .with_log_path("/tmp/defer.log");
        assert_eq!(opts.delay, Some(Duration::from_millis(100)));
        assert_eq!(opts.disable, Some(true));
        assert!(opts.log_path.is_some());
    }

    // Single test for every env-dependent case: the variable is process-wide
    // state and parallel test threads must not race on it.
    #[test]
    fn disable_precedence() {
        assert!(disable_resolved(Some(true)));
        assert!(!disable_resolved(Some(false)));

        unsafe { std::env::set_var(DISABLE_ENV_VAR, "yes") };
        assert!(disable_resolved(None));
        // Explicit flag beats a truthy environment.
        assert!(!disable_resolved(Some(false)));

        unsafe { std::env::set_var(DISABLE_ENV_VAR, "0") };
        assert!(!disable_resolved(None));

        unsafe { std::env::remove_var(DISABLE_ENV_VAR) };
        assert!(!disable_resolved(None));
    }
}
