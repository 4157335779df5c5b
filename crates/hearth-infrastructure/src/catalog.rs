//! Known-model catalog.

use std::collections::BTreeMap;

use hearth_core::config::{ModelConfig, ModelType, RootConfig};
use hearth_core::runtime::ModelCatalog;

struct BuiltinModel {
    id: &'static str,
    display_name: &'static str,
    model_type: ModelType,
    repository: &'static str,
}

const BUILTIN_MODELS: &[BuiltinModel] = &[
    BuiltinModel {
        id: "llama-3.2-1b-instruct-4bit",
        display_name: "Llama 3.2 1B",
        model_type: ModelType::Regular,
        repository: "mlx-community/Llama-3.2-1B-Instruct-4bit",
    },
    BuiltinModel {
        id: "llama-3.2-3b-instruct-4bit",
        display_name: "Llama 3.2 3B",
        model_type: ModelType::Regular,
        repository: "mlx-community/Llama-3.2-3B-Instruct-4bit",
    },
    BuiltinModel {
        id: "qwen2.5-1.5b-instruct-4bit",
        display_name: "Qwen 2.5 1.5B",
        model_type: ModelType::Regular,
        repository: "mlx-community/Qwen2.5-1.5B-Instruct-4bit",
    },
    BuiltinModel {
        id: "deepseek-r1-distill-qwen-1.5b-4bit",
        display_name: "DeepSeek R1 Distill 1.5B",
        model_type: ModelType::Reasoning,
        repository: "mlx-community/DeepSeek-R1-Distill-Qwen-1.5B-4bit",
    },
];

impl BuiltinModel {
    fn to_config(&self) -> ModelConfig {
        ModelConfig {
            id: self.id.to_string(),
            display_name: self.display_name.to_string(),
            model_type: self.model_type,
            repository: Some(self.repository.to_string()),
        }
    }
}

/// In-memory catalog. Lookups never touch disk or network.
#[derive(Debug, Clone, Default)]
pub struct StaticModelCatalog {
    models: BTreeMap<String, ModelConfig>,
}

impl StaticModelCatalog {
    /// Catalog with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Catalog of the built-in models.
    pub fn builtin() -> Self {
        Self::empty().with_models(BUILTIN_MODELS.iter().map(BuiltinModel::to_config))
    }

    /// Built-in models plus `[[models]]` from config; config entries win on id clashes.
    pub fn from_config(config: &RootConfig) -> Self {
        Self::builtin().with_models(config.models.iter().cloned())
    }

    pub fn with_models(mut self, models: impl IntoIterator<Item = ModelConfig>) -> Self {
        for model in models {
            self.models.insert(model.id.clone(), model);
        }
        self
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl ModelCatalog for StaticModelCatalog {
    fn lookup(&self, id: &str) -> Option<ModelConfig> {
        self.models.get(id).cloned()
    }
}
