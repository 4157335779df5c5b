//! Execution layer for Hearth.
//!
//! Runs generation off the async executor, streams partial output to
//! observers, and wires the whole stack together at startup.

pub mod bootstrap;
pub mod orchestrator;
pub mod tracing_layer;

pub use bootstrap::{AppContext, bootstrap};
pub use orchestrator::{GenerationOrchestrator, GenerationOutput, GenerationSnapshot, GenerationStatus};
pub use tracing_layer::{DiagnosticEvent, DiagnosticEventLayer, init_tracing};
