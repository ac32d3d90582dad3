//! Caller-side session state: the shared namespace and the process-wide
//! completion registry.

pub mod completion;
pub mod namespace;

pub use completion::{ArgumentCompleter, CompletionRegistry};
pub use namespace::{
    ExtensionKind, Namespace, Session, SessionExtension, SessionFn, SessionSnapshot,
};
