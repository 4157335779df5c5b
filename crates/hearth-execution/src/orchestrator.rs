//! Generation Orchestrator.
//!
//! Drives one generation at a time: obtains a model handle, assembles the
//! prompt, and runs streaming compute on the blocking pool. The token callback
//! never touches coordination state directly; it sends throttled partial
//! output over a channel that the async side drains and publishes.
//!
//! Every suspension point is bracketed by recorder lines so that, after a
//! crash inside native compute, the last line in the log shows how far the
//! run got.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use hearth_application::InferenceSessionManager;
use hearth_core::config::GenerationSettings;
use hearth_core::conversation::{ConversationSource, GenerationRequest};
use hearth_core::diagnostics::{DiagnosticSink, SharedSink};
use hearth_core::error::{HearthError, Result};
use hearth_core::runtime::{PromptAssembler, SeedSource, TokenDecision, TokenId, WallClockSeed};
use serde::Serialize;
use tokio::sync::{mpsc, watch};

const GENERATE_SIGNPOST: &str = "generate";
const COMPUTE_SIGNPOST: &str = "streaming-compute";

/// How a `generate` call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Completed,
    Cancelled,
    /// Another run was already active; nothing was generated
    Rejected,
}

/// Result of a `generate` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOutput {
    pub text: String,
    pub token_count: usize,
    pub elapsed: Duration,
    pub tokens_per_second: f64,
    pub status: GenerationStatus,
}

impl GenerationOutput {
    fn rejected() -> Self {
        Self {
            text: String::new(),
            token_count: 0,
            elapsed: Duration::ZERO,
            tokens_per_second: 0.0,
            status: GenerationStatus::Rejected,
        }
    }
}

/// Observable view of the current run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationSnapshot {
    pub running: bool,
    pub is_thinking: bool,
    /// Latest published text; `"Failed: ..."` after an error
    pub output: String,
    pub token_count: usize,
    pub tokens_per_second: f64,
}

/// Partial output sent from the compute thread.
struct Partial {
    text: String,
    token_count: usize,
}

pub struct GenerationOrchestrator {
    session: Arc<InferenceSessionManager>,
    assembler: Arc<dyn PromptAssembler>,
    seed: Arc<dyn SeedSource>,
    settings: GenerationSettings,
    running: Arc<AtomicBool>,
    cancelled: Arc<AtomicBool>,
    snapshot: Arc<watch::Sender<GenerationSnapshot>>,
    sink: SharedSink,
}

impl GenerationOrchestrator {
    /// Creates an orchestrator with default settings and wall-clock seeding.
    pub fn new(session: Arc<InferenceSessionManager>, assembler: Arc<dyn PromptAssembler>) -> Self {
        let (snapshot, _) = watch::channel(GenerationSnapshot::default());
        Self {
            session,
            assembler,
            seed: Arc::new(WallClockSeed),
            settings: GenerationSettings::default(),
            running: Arc::new(AtomicBool::new(false)),
            cancelled: Arc::new(AtomicBool::new(false)),
            snapshot: Arc::new(snapshot),
            sink: None,
        }
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_seed_source(mut self, seed: Arc<dyn SeedSource>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_recorder(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn session(&self) -> &Arc<InferenceSessionManager> {
        &self.session
    }

    /// Generates a reply to `conversation` with `model_id`.
    ///
    /// The conversation is copied before the first suspension point, so the
    /// caller's store may change while the run proceeds.
    ///
    /// If a run is already active this returns immediately with
    /// [`GenerationStatus::Rejected`] and empty text. Requests are dropped,
    /// never queued.
    ///
    /// Dropping the returned future cancels the run. The orchestrator stays
    /// busy until the compute thread has actually returned.
    ///
    /// # Errors
    ///
    /// Load, prompt-assembly and compute failures are returned as-is; the
    /// snapshot's `output` also carries `"Failed: <description>"`.
    pub async fn generate<C>(
        &self,
        model_id: &str,
        conversation: &C,
        system_prompt: &str,
    ) -> Result<GenerationOutput>
    where
        C: ConversationSource + ?Sized,
    {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.log("[Orchestrator] Generation already running; request dropped");
            tracing::debug!("[Orchestrator] Rejected generate for {}", model_id);
            return Ok(GenerationOutput::rejected());
        }
        let mut active = ActiveRun {
            lease: Arc::new(RunLease {
                running: Arc::clone(&self.running),
                snapshot: Arc::clone(&self.snapshot),
            }),
            cancelled: &self.cancelled,
            sink: &self.sink,
            settled: false,
        };

        self.cancelled.store(false, Ordering::SeqCst);
        let request = GenerationRequest::new(model_id, conversation, system_prompt);
        self.snapshot.send_replace(GenerationSnapshot {
            running: true,
            ..GenerationSnapshot::default()
        });
        let started = Instant::now();

        self.signpost_begin(GENERATE_SIGNPOST, model_id);
        tracing::info!(
            "[Orchestrator] Generate with {} ({} messages)",
            model_id,
            request.messages.len()
        );

        let outcome = self.run(request, started, Arc::clone(&active.lease)).await;
        active.settled = true;
        match outcome {
            Ok(output) => {
                self.signpost_end(
                    GENERATE_SIGNPOST,
                    &format!("tokens={} status={:?}", output.token_count, output.status),
                );
                Ok(output)
            }
            Err(e) => {
                let failure = format!("Failed: {}", e);
                self.snapshot.send_modify(|s| {
                    s.output = failure.clone();
                    s.is_thinking = false;
                });
                self.log(&format!("[Orchestrator] {}", failure));
                self.signpost_end(GENERATE_SIGNPOST, "failed");
                tracing::error!("[Orchestrator] Generation with {} failed: {}", model_id, e);
                Err(e)
            }
        }
    }

    /// Requests cooperative cancellation of the active run.
    ///
    /// Returns at once; the run stops at its next token callback.
    pub fn stop(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.snapshot.send_modify(|s| s.is_thinking = false);
        self.log("[Orchestrator] Stop requested");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> GenerationSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<GenerationSnapshot> {
        self.snapshot.subscribe()
    }

    async fn run(
        &self,
        request: GenerationRequest,
        started: Instant,
        lease: Arc<RunLease>,
    ) -> Result<GenerationOutput> {
        let model_id = request.model_id.as_str();
        self.log(&format!("[Orchestrator] Requesting model handle for {}", model_id));
        let handle = self.session.load(model_id).await?;
        self.log(&format!("[Orchestrator] Model handle ready: {}", handle.model_id()));

        self.log("[Orchestrator] Assembling prompt");
        let prompt = self
            .assembler
            .prompt_history(&request.messages, &request.system_prompt)
            .await?;
        self.log(&format!(
            "[Orchestrator] Prompt assembled ({} entries)",
            prompt.messages.len()
        ));

        if handle.config().is_reasoning() {
            self.snapshot.send_modify(|s| s.is_thinking = true);
        }

        let seed = self.seed.next_seed();
        handle.reseed(seed);
        let input = handle.prepare(&prompt)?;
        self.log_with_memory(&format!(
            "[Orchestrator] Input prepared ({} tokens, seed {})",
            input.tokens.len(),
            seed
        ));

        let params = self.settings.parameters();
        let max_tokens = params.max_tokens;
        let publish_interval = self.settings.publish_interval.max(1);
        let cancelled = Arc::clone(&self.cancelled);
        let compute_handle = Arc::clone(&handle);
        let (partial_tx, mut partial_rx) = mpsc::unbounded_channel::<Partial>();

        self.signpost_begin(COMPUTE_SIGNPOST, model_id);
        let compute = tokio::task::spawn_blocking(move || {
            // Held until the handle is free again, even if the caller went away
            let _lease = lease;
            let mut on_tokens = |tokens: &[TokenId]| {
                if cancelled.load(Ordering::SeqCst) {
                    return TokenDecision::Stop;
                }
                let count = tokens.len();
                if count % publish_interval == 0 {
                    let _ = partial_tx.send(Partial {
                        text: compute_handle.decode(tokens),
                        token_count: count,
                    });
                }
                if count >= max_tokens {
                    TokenDecision::Stop
                } else {
                    TokenDecision::More
                }
            };
            compute_handle.streaming_generate(&input, &params, &mut on_tokens)
        });

        let mut last_published = String::new();
        while let Some(partial) = partial_rx.recv().await {
            self.snapshot.send_modify(|s| {
                s.output.clone_from(&partial.text);
                s.token_count = partial.token_count;
            });
            last_published = partial.text;
        }

        let result = compute
            .await
            .map_err(|e| HearthError::internal(format!("Compute task aborted: {}", e)));
        self.signpost_end(COMPUTE_SIGNPOST, if result.is_ok() { "returned" } else { "aborted" });
        let result = result??;
        self.log(&format!(
            "[Orchestrator] Streaming compute returned {} tokens",
            result.token_count
        ));

        let elapsed = started.elapsed();
        let tokens_per_second = if elapsed.as_secs_f64() > 0.0 {
            result.token_count as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let status = if self.cancelled.load(Ordering::SeqCst) {
            GenerationStatus::Cancelled
        } else {
            GenerationStatus::Completed
        };

        self.snapshot.send_modify(|s| {
            if result.output != last_published {
                s.output.clone_from(&result.output);
            }
            s.token_count = result.token_count;
            s.tokens_per_second = tokens_per_second;
            s.is_thinking = false;
        });

        tracing::info!(
            "[Orchestrator] {} tokens in {:.2}s ({:.1} tok/s, {:?})",
            result.token_count,
            elapsed.as_secs_f64(),
            tokens_per_second,
            status
        );

        Ok(GenerationOutput {
            text: result.output,
            token_count: result.token_count,
            elapsed,
            tokens_per_second,
            status,
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

    fn signpost_begin(&self, name: &str, metadata: &str) {
        if let Some(sink) = &self.sink {
            sink.begin_signpost(name, metadata);
        }
    }

    fn signpost_end(&self, name: &str, metadata: &str) {
        if let Some(sink) = &self.sink {
            sink.end_signpost(name, metadata);
        }
    }
}

/// Single-flight ownership of the model handle.
///
/// Shared between the `generate` call and its compute thread; the flag is
/// cleared when the last holder lets go.
struct RunLease {
    running: Arc<AtomicBool>,
    snapshot: Arc<watch::Sender<GenerationSnapshot>>,
}

impl Drop for RunLease {
    fn drop(&mut self) {
        self.snapshot.send_modify(|s| s.running = false);
        self.running.store(false, Ordering::SeqCst);
    }
}

/// The `generate` call's side of a run.
///
/// Dropped unsettled means the caller abandoned the future mid-run.
struct ActiveRun<'a> {
    lease: Arc<RunLease>,
    cancelled: &'a AtomicBool,
    sink: &'a SharedSink,
    settled: bool,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(sink) = self.sink {
            sink.log("[Orchestrator] Generate call abandoned; cancelling compute");
        }
        tracing::warn!("[Orchestrator] Generate call dropped before completion");
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
