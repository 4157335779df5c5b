//! Domain types and ports for Hearth.
//!
//! `hearth-core` has no knowledge of the neural-network runtime, the tokenizer,
//! prompt templates or the conversation store. It declares the traits those
//! collaborators implement and the value types that cross between them and the
//! session manager / generation orchestrator.

pub mod config;
pub mod conversation;
pub mod diagnostics;
pub mod error;
pub mod runtime;
pub mod session;

// Re-export common error type
pub use error::HearthError;
