//! Crash-resilient diagnostic recorder.
//!
//! - `recorder`: synchronous durable log with memory and stack variants
//! - `signpost`: named timing spans on a serialized lane
//! - `fatal`: signal handlers and panic hook
//! - `memory`: resident-memory sampling
//! - `stack`: bounded call-stack rendering

pub mod fatal;
pub mod memory;
pub mod recorder;
pub mod signpost;
pub mod stack;

pub use recorder::{DIAGNOSTICS_TARGET, DiagnosticRecorder, SIGNPOST_TARGET};
