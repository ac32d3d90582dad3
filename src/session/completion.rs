//! Process-wide completion registry.
//!
//! The registry is the one piece of truly shared mutable state between the
//! caller and a worker. It is a singleton created lazily on first use and
//! lives for the process lifetime; both contexts hold the same reference,
//! so completions registered by either side are visible to both.
//!
//! Registrations for distinct commands are safe from both contexts
//! concurrently. Registering the *same* command from both contexts at once
//! is last-writer-wins — avoiding that is the caller's responsibility, not
//! something this registry arbitrates.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

/// Provides candidate completions for a named command's arguments.
pub trait ArgumentCompleter: Send + Sync {
    fn complete(&self, prefix: &str) -> Vec<String>;
}

impl<F> ArgumentCompleter for F
where
    F: Fn(&str) -> Vec<String> + Send + Sync,
{
    fn complete(&self, prefix: &str) -> Vec<String> {
        self(prefix)
    }
}

/// Table of argument completers keyed by command name.
pub struct CompletionRegistry {
    completers: RwLock<HashMap<String, Arc<dyn ArgumentCompleter>>>,
}

static REGISTRY: OnceLock<CompletionRegistry> = OnceLock::new();

impl CompletionRegistry {
    /// The process-wide registry, created on first use. `OnceLock` makes
    /// the lazy initialization race-free: concurrent first callers observe
    /// a single instance.
    pub fn global() -> &'static CompletionRegistry {
        REGISTRY.get_or_init(|| CompletionRegistry {
            completers: RwLock::new(HashMap::new()),
        })
    }

    /// Register a completer for `command`. Replaces any existing entry.
    pub fn register(&self, command: impl Into<String>, completer: Arc<dyn ArgumentCompleter>) {
        self.completers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command.into(), completer);
    }

    /// Candidate completions for `command` given `prefix`; empty when no
    /// completer is registered.
    pub fn complete(&self, command: &str, prefix: &str) -> Vec<String> {
        let completer = self
            .completers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(command)
            .cloned();
        match completer {
            Some(c) => c.complete(prefix),
            None => Vec::new(),
        }
    }

    /// Whether a completer is registered for `command`.
    pub fn contains(&self, command: &str) -> bool {
        self.completers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(command)
    }

    /// Number of registered completers.
    pub fn count(&self) -> usize {
        self.completers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
