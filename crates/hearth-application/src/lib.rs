//! Application layer for Hearth.
//!
//! Owns the model-lifecycle state machine and mediates every request for a
//! ready model handle.

pub mod session_manager;

pub use session_manager::InferenceSessionManager;
