use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use hearth_core::config::ModelConfig;
use hearth_core::diagnostics::{DiagnosticSink, SharedSink};
use hearth_core::error::{HearthError, Result};
use hearth_core::runtime::{
    LoadProgress, ModelCatalog, ModelHandle, ModelRuntime, ProgressCallback,
};
use hearth_core::session::{SessionEvent, SessionState};
use tokio::sync::watch;
use tokio::task::JoinHandle;

const LOAD_SIGNPOST: &str = "model-load";

/// Owns the model-lifecycle state machine.
///
/// `InferenceSessionManager` is responsible for:
/// - Resolving identifiers against the model catalog
/// - Loading at most one model at a time through the runtime
/// - Publishing load progress to subscribers
/// - Dropping the loaded model on a switch
///
/// Loads are serialized by `load_gate`: a caller arriving while another load
/// is in flight waits for it, then re-checks whether its model is now loaded.
/// Every switch bumps `epoch`; a load that finishes under a stale epoch never
/// installs its handle.
pub struct InferenceSessionManager {
    catalog: Arc<dyn ModelCatalog>,
    runtime: Arc<dyn ModelRuntime>,
    sink: SharedSink,
    state: Arc<Mutex<SessionState>>,
    progress: Arc<watch::Sender<LoadProgress>>,
    load_gate: tokio::sync::Mutex<()>,
    epoch: Arc<AtomicU64>,
    active_config: RwLock<Option<ModelConfig>>,
}

impl InferenceSessionManager {
    /// Creates a manager in the `Idle` state.
    ///
    /// # Arguments
    ///
    /// * `catalog` - Static lookup of loadable models
    /// * `runtime` - The external runtime that materializes models
    pub fn new(catalog: Arc<dyn ModelCatalog>, runtime: Arc<dyn ModelRuntime>) -> Self {
        let (progress, _) = watch::channel(LoadProgress::idle());
        Self {
            catalog,
            runtime,
            sink: None,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            progress: Arc::new(progress),
            load_gate: tokio::sync::Mutex::new(()),
            epoch: Arc::new(AtomicU64::new(0)),
            active_config: RwLock::new(None),
        }
    }

    /// Attaches a diagnostic sink. Without one the manager runs silently.
    pub fn with_recorder(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Returns a handle for `model_id`, loading it if needed.
    ///
    /// Already loaded: returns the same handle with no side effects.
    ///
    /// # Errors
    ///
    /// - `ModelNotFound` if the catalog does not know `model_id` (state untouched)
    /// - Whatever the runtime reports if materialization fails (state back to `Idle`)
    /// - `LoadSuperseded` if a `switch_model` happened while loading
    pub async fn load(&self, model_id: &str) -> Result<Arc<dyn ModelHandle>> {
        let Some(config) = self.catalog.lookup(model_id) else {
            self.log(&format!("[SessionManager] Unknown model '{}'", model_id));
            return Err(HearthError::model_not_found(model_id));
        };
        self.load_config(config).await
    }

    /// Loads an already-resolved configuration.
    pub async fn load_config(&self, config: ModelConfig) -> Result<Arc<dyn ModelHandle>> {
        if let Some(handle) = self.loaded_handle(&config.id) {
            return Ok(handle);
        }

        let _gate = self.load_gate.lock().await;

        // Another caller may have finished this load while we waited
        if let Some(handle) = self.loaded_handle(&config.id) {
            return Ok(handle);
        }

        let epoch = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(next) = state.transition(SessionEvent::BeginLoad) {
                *state = next;
            }
            self.epoch.load(Ordering::SeqCst)
        };
        self.progress
            .send_replace(LoadProgress::new(0.0, format!("Loading {}", config.label())));

        self.log_with_memory(&format!("[SessionManager] Load begin: {}", config.id));
        self.signpost_begin(&config.id);
        tracing::info!("[SessionManager] Loading model {}", config.id);

        let on_progress = self.progress_callback(epoch);
        let result = self.runtime.load(&config, on_progress).await;

        self.log(&format!(
            "[SessionManager] Runtime load returned for {} (ok={})",
            config.id,
            result.is_ok()
        ));

        let committed = match &result {
            Ok(handle) => self.commit_load(
                epoch,
                SessionEvent::Loaded(Arc::clone(handle)),
                LoadProgress::new(1.0, format!("Loaded {}", config.label())),
                Some(&config),
            ),
            Err(_) => self.commit_load(epoch, SessionEvent::Failed, LoadProgress::idle(), None),
        };
        if !committed {
            self.signpost_end(&config.id, "superseded");
            tracing::info!(
                "[SessionManager] Discarding load of {}; session switched meanwhile",
                config.id
            );
            return Err(HearthError::LoadSuperseded { id: config.id });
        }

        match result {
            Ok(handle) => {
                self.log_with_memory(&format!("[SessionManager] Model ready: {}", config.id));
                self.signpost_end(&config.id, "loaded");
                Ok(handle)
            }
            Err(e) => {
                self.log(&format!("[SessionManager] Load of {} failed: {}", config.id, e));
                self.signpost_end(&config.id, "failed");
                tracing::error!("[SessionManager] Failed to load {}: {}", config.id, e);
                Err(e)
            }
        }
    }

    /// Drops the current model and starts loading `config` in the background.
    ///
    /// Before returning, state is `Idle` and progress is 0. Failures of the
    /// background load are logged, never surfaced; await the returned handle
    /// only to know when it has settled.
    pub fn switch_model(self: &Arc<Self>, config: ModelConfig) -> JoinHandle<()> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            self.epoch.fetch_add(1, Ordering::SeqCst);
            if let Some(next) = state.transition(SessionEvent::Reset) {
                *state = next;
            }
            self.progress.send_replace(LoadProgress::idle());
            *self
                .active_config
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        }

        self.log(&format!("[SessionManager] Switching to {}", config.id));

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let model_id = config.id.clone();
            if let Err(e) = manager.load_config(config).await {
                manager.log(&format!(
                    "[SessionManager] Background load of {} ended: {}",
                    model_id, e
                ));
                tracing::warn!("[SessionManager] Background load of {} ended: {}", model_id, e);
            }
        })
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> SessionState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn fraction(&self) -> f64 {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .fraction()
    }

    /// Latest progress report; subscribers see every change.
    pub fn subscribe_progress(&self) -> watch::Receiver<LoadProgress> {
        self.progress.subscribe()
    }

    pub fn active_config(&self) -> Option<ModelConfig> {
        self.active_config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn loaded_handle(&self, model_id: &str) -> Option<Arc<dyn ModelHandle>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .handle_for(model_id)
    }

    /// Settles the load started under `epoch`.
    ///
    /// The epoch check, the transition and the published side effects happen
    /// under the state lock, the same lock `switch_model` resets under.
    /// Returns false, touching nothing, if a switch came first.
    fn commit_load(
        &self,
        epoch: u64,
        event: SessionEvent,
        report: LoadProgress,
        config: Option<&ModelConfig>,
    ) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if self.epoch.load(Ordering::SeqCst) != epoch {
            return false;
        }
        let Some(next) = state.transition(event) else {
            tracing::debug!(
                "[SessionManager] Load outcome rejected in {} state",
                state.name()
            );
            return false;
        };
        *state = next;
        if let Some(config) = config {
            *self
                .active_config
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(config.clone());
        }
        self.progress.send_replace(report);
        true
    }

    /// Progress from the runtime lands here, possibly on another thread.
    fn progress_callback(&self, epoch: u64) -> ProgressCallback {
        let state = Arc::clone(&self.state);
        let progress = Arc::clone(&self.progress);
        let current_epoch = Arc::clone(&self.epoch);

        Arc::new(move |report: LoadProgress| {
            let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
            if current_epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            if let Some(next) = state.transition(SessionEvent::Progress(report.fraction)) {
                *state = next;
                progress.send_replace(report);
            }
        })
    }

    fn log(&self, message: &str) {
        if let Some(sink) = &self.sink {
            sink.log(message);
        }
    }

    fn log_with_memory(&self, message: &str) {
        if let Some(sink) = &self.sink {
            sink.log_with_memory(message);
        }
    }

    fn signpost_begin(&self, model_id: &str) {
        if let Some(sink) = &self.sink {
            sink.begin_signpost(LOAD_SIGNPOST, model_id);
        }
    }

    fn signpost_end(&self, model_id: &str, outcome: &str) {
        if let Some(sink) = &self.sink {
            sink.end_signpost(LOAD_SIGNPOST, &format!("{} {}", model_id, outcome));
        }
    }
}

#[cfg(test)]
#[path = "session_manager_test.rs"]
mod tests;
