//! Diagnostic hook.
//!
//! A list can be given a callback that observes every committed mutation
//! and every recoverable warning. The hook is optional and never affects
//! the outcome of an operation. Warnings are also logged through
//! `tracing` whether or not a hook is installed.

use std::fmt;
use std::sync::Arc;

use crate::EventKind;

/// Callback invoked with each [`Diagnostic`].
///
/// Runs on the thread that produced the diagnostic, usually while the
/// list's lock is held. It must not call back into the same list.
pub type DiagnosticHook = Arc<dyn Fn(&Diagnostic) + Send + Sync>;

/// Something worth reporting that is not an error for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A mutation committed.
    Mutation { kind: EventKind, key: String },

    /// A value could not be encoded for write-through; the store call
    /// was skipped.
    EncodeFailed { key: String, reason: String },

    /// The store rejected a write-through or read-through call.
    StoreFailed {
        operation: &'static str,
        key: String,
        reason: String,
    },

    /// An event was displaced from a full sink.
    EventDropped { key: String, kind: EventKind },

    /// An event was handed to a detached delivery thread because the sink
    /// was near capacity. `outstanding` counts deliveries not yet enqueued,
    /// this one included.
    DetachedDelivery { key: String, outstanding: usize },

    /// A detached delivery thread could not be spawned; the event was
    /// delivered synchronously instead.
    SpawnFailed { key: String, reason: String },
}

impl Diagnostic {
    /// Returns `true` for the variants that are also logged as warnings.
    pub fn is_warning(&self) -> bool {
        !matches!(self, Self::Mutation { .. } | Self::DetachedDelivery { .. })
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mutation { kind, key } => write!(f, "{kind} {key}"),
            Self::EncodeFailed { key, reason } => {
                write!(f, "failed to encode value for {key}: {reason}")
            }
            Self::StoreFailed {
                operation,
                key,
                reason,
            } => write!(f, "store {operation} failed for {key}: {reason}"),
            Self::EventDropped { key, kind } => {
                write!(f, "dropped {kind} event for {key}")
            }
            Self::DetachedDelivery { key, outstanding } => {
                write!(f, "detached delivery for {key} ({outstanding} outstanding)")
            }
            Self::SpawnFailed { key, reason } => {
                write!(f, "failed to spawn delivery for {key}: {reason}")
            }
        }
    }
}

/// Shared dispatch to an optional hook.
#[derive(Clone, Default)]
pub(crate) struct Diagnostics {
    hook: Option<DiagnosticHook>,
}

impl Diagnostics {
    pub(crate) fn new(hook: Option<DiagnosticHook>) -> Self {
        Self { hook }
    }

    pub(crate) fn emit(&self, diagnostic: Diagnostic) {
        if diagnostic.is_warning() {
            tracing::warn!("{diagnostic}");
        }
        if let Some(hook) = &self.hook {
            hook(&diagnostic);
        }
    }

    pub(crate) fn mutation(&self, kind: EventKind, key: &str) {
        tracing::debug!(key, %kind, "mutation committed");
        if let Some(hook) = &self.hook {
            hook(&Diagnostic::Mutation {
                kind,
                key: key.to_owned(),
            });
        }
    }
}

impl fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Diagnostics")
            .field("hook", &self.hook.is_some())
            .finish()
    }
}
