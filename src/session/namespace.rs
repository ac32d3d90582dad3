//! The caller's namespace and the snapshot handle shared with a worker.
//!
//! The namespace is shared by reference, never copied: a binding made by
//! the deferred work through its snapshot handle is the same binding the
//! caller sees on its next lookup. There is no merge step for namespace
//! state — both sides read and write the same maps.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::WorkError;
use crate::session::completion::CompletionRegistry;

/// A callable function binding.
pub trait SessionFn: Send + Sync {
    fn invoke(&self, args: &[Value]) -> Result<Value, WorkError>;
}

impl<F> SessionFn for F
where
    F: Fn(&[Value]) -> Result<Value, WorkError> + Send + Sync,
{
    fn invoke(&self, args: &[Value]) -> Result<Value, WorkError> {
        self(args)
    }
}

/// Kind of a session-wide registration that is not a namespace binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtensionKind {
    /// Display-formatting registration.
    Format,
    /// Type-extension registration.
    Type,
}

/// A session-wide side effect registered by a worker. These are scoped to
/// the worker's isolated environment during execution and merged into the
/// caller's session by the completion watcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionExtension {
    pub name: String,
    pub kind: ExtensionKind,
}

impl SessionExtension {
    pub fn new(name: impl Into<String>, kind: ExtensionKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

#[derive(Default)]
struct Bindings {
    variables: HashMap<String, Value>,
    functions: HashMap<String, Arc<dyn SessionFn>>,
    aliases: HashMap<String, String>,
}

/// The set of named bindings visible within an execution context:
/// variables, functions, and aliases.
///
/// Cloning a `Namespace` clones the handle, not the bindings; all clones
/// observe the same underlying maps.
#[derive(Clone, Default)]
pub struct Namespace {
    inner: Arc<RwLock<Bindings>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Bindings> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Bindings> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind a variable.
    pub fn set_var(&self, name: impl Into<String>, value: Value) {
        self.write().variables.insert(name.into(), value);
    }

    /// Look up a variable.
    pub fn var(&self, name: &str) -> Option<Value> {
        self.read().variables.get(name).cloned()
    }

    /// Bind a function.
    pub fn define_fn(&self, name: impl Into<String>, f: Arc<dyn SessionFn>) {
        self.write().functions.insert(name.into(), f);
    }

    /// Whether a function binding exists.
    pub fn has_fn(&self, name: &str) -> bool {
        self.read().functions.contains_key(name)
    }

    /// Invoke a function binding by name.
    pub fn invoke_fn(&self, name: &str, args: &[Value]) -> Result<Value, WorkError> {
        let f = self
            .read()
            .functions
            .get(name)
            .cloned()
            .ok_or_else(|| WorkError::NameNotFound {
                name: name.to_string(),
            })?;
        f.invoke(args)
    }

    /// Bind an alias.
    pub fn set_alias(&self, name: impl Into<String>, target: impl Into<String>) {
        self.write().aliases.insert(name.into(), target.into());
    }

    /// Look up an alias target.
    pub fn alias(&self, name: &str) -> Option<String> {
        self.read().aliases.get(name).cloned()
    }

    /// Number of variable bindings (diagnostics and tests).
    pub fn var_count(&self) -> usize {
        self.read().variables.len()
    }
}

/// The caller's session: its namespace plus the session-wide extension
/// table that workers cannot reach through the shared namespace.
///
/// Cheap to clone; all clones share state.
#[derive(Clone, Default)]
pub struct Session {
    namespace: Namespace,
    extensions: Arc<RwLock<Vec<SessionExtension>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// The session's namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Session-wide extensions registered so far.
    pub fn extensions(&self) -> Vec<SessionExtension> {
        self.extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Merge worker-registered extensions into the session, skipping
    /// duplicates already present.
    pub(crate) fn merge_extensions(&self, extra: Vec<SessionExtension>) {
        if extra.is_empty() {
            return;
        }
        let mut table = self
            .extensions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for ext in extra {
            if !table.contains(&ext) {
                table.push(ext);
            }
        }
    }

    /// Capture the snapshot handle a worker executes against. The handle
    /// references this session's namespace and the process-wide completion
    /// registry; it does not copy either.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            namespace: self.namespace.clone(),
            completions: CompletionRegistry::global(),
        }
    }
}

/// Capability-scoped execution handle over the caller's namespace.
///
/// Bindings made through the snapshot land directly in the caller's
/// namespace; completion registrations go to the process-wide registry
/// shared by both contexts.
#[derive(Clone)]
pub struct SessionSnapshot {
    namespace: Namespace,
    completions: &'static CompletionRegistry,
}

impl SessionSnapshot {
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn completions(&self) -> &'static CompletionRegistry {
        self.completions
    }
}
