//! Infrastructure layer for Hearth.
//!
//! File-system paths, `config.toml` loading, the built-in model catalog and the
//! crash-resilient diagnostic recorder.

pub mod catalog;
pub mod config_service;
pub mod diagnostics;
pub mod paths;

pub use catalog::StaticModelCatalog;
pub use config_service::ConfigService;
pub use diagnostics::DiagnosticRecorder;
pub use paths::HearthPaths;
