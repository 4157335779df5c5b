//! Configuration types.
//!
//! `RootConfig` is the in-memory form of `config.toml`. Every section carries
//! serde defaults so a missing or partial file still yields a usable config.

use serde::{Deserialize, Serialize};

/// Default sampling temperature for chat generation.
pub const DEFAULT_TEMPERATURE: f32 = 0.5;
/// Hard cap on generated tokens per run.
pub const DEFAULT_MAX_TOKENS: usize = 4096;
/// Partial output is decoded and published every N tokens.
pub const DEFAULT_PUBLISH_INTERVAL: usize = 4;
/// Fixed diagnostic log file name.
pub const DEFAULT_LOG_FILE_NAME: &str = "hearth-diagnostics.log";
/// Stack renderings stop after this many frames.
pub const DEFAULT_MAX_STACK_FRAMES: usize = 15;

/// Declared model type. Reasoning models flip the orchestrator's `is_thinking` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    #[default]
    Regular,
    Reasoning,
}

/// Catalog entry describing a model the runtime knows how to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Stable identifier (e.g. `qwen2.5-1.5b-instruct-4bit`)
    pub id: String,
    /// Human-readable name shown in progress status text
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub model_type: ModelType,
    /// Where the runtime fetches weights from
    #[serde(default)]
    pub repository: Option<String>,
}

impl ModelConfig {
    pub fn new(id: impl Into<String>, model_type: ModelType) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            model_type,
            repository: None,
        }
    }

    pub fn is_reasoning(&self) -> bool {
        self.model_type == ModelType::Reasoning
    }

    /// Name used in status strings; falls back to the identifier.
    pub fn label(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }
}

/// Parameters handed to the streaming compute entry point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParameters {
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// `[generation]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub max_tokens: usize,
    pub publish_interval: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            publish_interval: DEFAULT_PUBLISH_INTERVAL,
        }
    }
}

impl GenerationSettings {
    pub fn parameters(&self) -> GenerationParameters {
        GenerationParameters {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// `[diagnostics]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsSettings {
    /// Overrides the per-install logs directory
    pub log_dir: Option<std::path::PathBuf>,
    pub file_name: String,
    /// Mirror every durable line to stderr when no global `tracing`
    /// subscriber is installed
    pub console_mirror: bool,
    pub max_stack_frames: usize,
}

impl Default for DiagnosticsSettings {
    fn default() -> Self {
        Self {
            log_dir: None,
            file_name: DEFAULT_LOG_FILE_NAME.to_string(),
            console_mirror: true,
            max_stack_frames: DEFAULT_MAX_STACK_FRAMES,
        }
    }
}

/// Root of `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RootConfig {
    pub diagnostics: DiagnosticsSettings,
    pub generation: GenerationSettings,
    /// Extra catalog entries merged over the built-in catalog
    pub models: Vec<ModelConfig>,
    /// Model loaded in the background at startup
    pub default_model: Option<String>,
}
