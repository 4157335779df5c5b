//! Diagnostic sink port.
//!
//! The session manager and orchestrator bracket every suspension point with
//! calls on this trait. They hold it as an `Option` and keep working when no
//! sink is wired in.

use std::sync::Arc;

pub trait DiagnosticSink: Send + Sync {
    /// Durably appends `message`; returns only after the line is on disk.
    fn log(&self, message: &str);

    /// As [`log`](Self::log), with a resident-memory sample appended.
    fn log_with_memory(&self, message: &str);

    /// As [`log`](Self::log), followed by a bounded call stack.
    fn log_with_stack(&self, message: &str);

    fn begin_signpost(&self, name: &str, metadata: &str);

    fn end_signpost(&self, name: &str, metadata: &str);

    fn event_signpost(&self, name: &str, metadata: &str);
}

/// Optional sink shared across components.
pub type SharedSink = Option<Arc<dyn DiagnosticSink>>;
