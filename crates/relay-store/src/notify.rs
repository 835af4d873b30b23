//! Operational event sink.

use std::fmt;

/// Severity of a reported event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyLevel {
    /// Developer diagnostics.
    Dev,
    /// Failures the operator should see.
    Error,
    /// Lifecycle milestones.
    Info,
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyLevel::Dev => write!(f, "dev"),
            NotifyLevel::Error => write!(f, "error"),
            NotifyLevel::Info => write!(f, "info"),
        }
    }
}

/// Receives operational events from the store.
///
/// This trait is object-safe and is held as `Arc<dyn Notifier>` by
/// [`Database`](crate::Database).
pub trait Notifier: Send + Sync {
    /// Report an event.
    fn notify(&self, level: NotifyLevel, message: &str);
}

/// Default notifier that forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, level: NotifyLevel, message: &str) {
        match level {
            NotifyLevel::Dev => tracing::debug!(target: "relay_store::notify", "{}", message),
            NotifyLevel::Info => tracing::info!(target: "relay_store::notify", "{}", message),
            NotifyLevel::Error => tracing::error!(target: "relay_store::notify", "{}", message),
        }
    }
}
