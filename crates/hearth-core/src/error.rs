//! Error types for Hearth.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the whole Hearth workspace.
///
/// Variants are structured so callers can branch on the failure kind instead of
/// parsing message text. `Clone` lets the same failure be both returned to the
/// caller and published on an observable channel.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum HearthError {
    /// Requested identifier is absent from the known-model catalog
    #[error("Model not found: '{id}'")]
    ModelNotFound { id: String },

    /// The runtime failed to materialize a model
    #[error("Model load failed: {0}")]
    Load(String),

    /// A load finished after the session had already moved to another model
    #[error("Load of '{id}' was superseded by a model switch")]
    LoadSuperseded { id: String },

    /// Streaming compute failed
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Prompt assembly failed
    #[error("Prompt assembly failed: {0}")]
    PromptAssembly(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HearthError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a ModelNotFound error
    pub fn model_not_found(id: impl Into<String>) -> Self {
        Self::ModelNotFound { id: id.into() }
    }

    /// Creates a Load error
    pub fn load(message: impl Into<String>) -> Self {
        Self::Load(message.into())
    }

    /// Creates a Generation error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    /// Creates an IO error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a ModelNotFound error
    pub fn is_model_not_found(&self) -> bool {
        matches!(self, Self::ModelNotFound { .. })
    }

    /// Check if this load lost a race against a model switch
    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::LoadSuperseded { .. })
    }

    /// Check if this is an IO error
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }

    /// Check if this is a config error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for HearthError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for HearthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for HearthError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::ser::Error> for HearthError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// Runtimes written against `anyhow` surface as internal errors
impl From<anyhow::Error> for HearthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<String> for HearthError {
    fn from(err: String) -> Self {
        Self::Internal(err)
    }
}

/// A type alias for `Result<T, HearthError>`.
pub type Result<T> = std::result::Result<T, HearthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_not_found_display() {
        let err = HearthError::model_not_found("model-Z");
        assert!(err.is_model_not_found());
        assert_eq!(err.to_string(), "Model not found: 'model-Z'");
    }

    #[test]
    fn test_io_conversion_keeps_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        let err: HearthError = io.into();
        assert!(err.is_io());
        assert!(err.to_string().contains("PermissionDenied"));
    }

    #[test]
    fn test_toml_conversion() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("= broken");
        let err: HearthError = parse.unwrap_err().into();
        match err {
            HearthError::Serialization { format, .. } => assert_eq!(format, "TOML"),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_superseded_predicate() {
        let err = HearthError::LoadSuperseded {
            id: "model-X".to_string(),
        };
        assert!(err.is_superseded());
        assert!(!err.is_model_not_found());
    }
}
