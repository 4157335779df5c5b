//! Startup wiring.
//!
//! Opens the diagnostic recorder first so everything after it (including a
//! crash during the initial model load) lands in the durable log.

use std::sync::Arc;

use hearth_application::InferenceSessionManager;
use hearth_core::config::RootConfig;
use hearth_core::diagnostics::DiagnosticSink;
use hearth_core::runtime::{ModelCatalog, ModelRuntime, PromptAssembler};
use hearth_infrastructure::diagnostics::fatal;
use hearth_infrastructure::{DiagnosticRecorder, HearthPaths, StaticModelCatalog};
use tokio::task::JoinHandle;

use crate::orchestrator::GenerationOrchestrator;

/// Everything a front end needs, built once at startup.
pub struct AppContext {
    pub config: RootConfig,
    /// `None` if the log could not be opened; the app still runs
    pub recorder: Option<Arc<DiagnosticRecorder>>,
    pub catalog: Arc<StaticModelCatalog>,
    pub session: Arc<InferenceSessionManager>,
    pub orchestrator: Arc<GenerationOrchestrator>,
    /// Background load of `default_model`, if one was configured
    pub initial_load: Option<JoinHandle<()>>,
}

impl AppContext {
    /// Writes the recorder's closing line.
    pub fn shutdown(&self) {
        if let Some(recorder) = &self.recorder {
            recorder.shutdown();
        }
    }
}

/// Builds the application graph.
///
/// Must be called inside a Tokio runtime when `config.default_model` is set,
/// since its load is spawned in the background.
pub fn bootstrap(
    config: RootConfig,
    paths: &HearthPaths,
    runtime: Arc<dyn ModelRuntime>,
    assembler: Arc<dyn PromptAssembler>,
) -> AppContext {
    let recorder = open_recorder(&config, paths);
    if let Some(recorder) = &recorder {
        fatal::install(recorder);
    }
    let sink = recorder
        .as_ref()
        .map(|r| Arc::clone(r) as Arc<dyn DiagnosticSink>);

    let catalog = Arc::new(StaticModelCatalog::from_config(&config));
    tracing::info!("[Bootstrap] Catalog ready with {} models", catalog.len());

    let mut session =
        InferenceSessionManager::new(Arc::clone(&catalog) as Arc<dyn ModelCatalog>, runtime);
    if let Some(sink) = &sink {
        session = session.with_recorder(Arc::clone(sink));
    }
    let session = Arc::new(session);

    let mut orchestrator = GenerationOrchestrator::new(Arc::clone(&session), assembler)
        .with_settings(config.generation.clone());
    if let Some(sink) = &sink {
        orchestrator = orchestrator.with_recorder(Arc::clone(sink));
    }
    let orchestrator = Arc::new(orchestrator);

    let initial_load = match config.default_model.as_deref() {
        Some(model_id) => match catalog.lookup(model_id) {
            Some(model) => Some(session.switch_model(model)),
            None => {
                tracing::warn!("[Bootstrap] Default model '{}' is not in the catalog", model_id);
                if let Some(sink) = &sink {
                    sink.log(&format!(
                        "[Bootstrap] Default model '{}' is not in the catalog",
                        model_id
                    ));
                }
                None
            }
        },
        None => None,
    };

    AppContext {
        config,
        recorder,
        catalog,
        session,
        orchestrator,
        initial_load,
    }
}

fn open_recorder(config: &RootConfig, paths: &HearthPaths) -> Option<Arc<DiagnosticRecorder>> {
    let settings = config.diagnostics.clone();
    let logs_dir = match (&settings.log_dir, paths.logs_dir()) {
        (Some(dir), _) => dir.clone(),
        (None, Ok(dir)) => dir,
        (None, Err(e)) => {
            tracing::warn!("[Bootstrap] No log directory, diagnostics disabled: {}", e);
            return None;
        }
    };

    match DiagnosticRecorder::open(settings, &logs_dir) {
        Ok(recorder) => Some(Arc::new(recorder)),
        Err(e) => {
            tracing::warn!("[Bootstrap] Failed to open diagnostic log: {}", e);
            None
        }
    }
}
