//! Ports implemented by the model runtime and its neighbours.
//!
//! The neural-network runtime, tokenizer and prompt templating live outside
//! this workspace. They plug in through the traits below.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::config::{GenerationParameters, ModelConfig};
use crate::conversation::{ChatMessage, MessageRole};
use crate::error::Result;

pub type TokenId = u32;

/// Answer of the per-token-batch callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenDecision {
    More,
    Stop,
}

/// Progress report emitted while a model materializes.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProgress {
    /// 0.0 ..= 1.0
    pub fraction: f64,
    /// Human-readable status, e.g. "Downloading qwen: 42%"
    pub status: String,
}

impl LoadProgress {
    pub fn new(fraction: f64, status: impl Into<String>) -> Self {
        Self {
            fraction: fraction.clamp(0.0, 1.0),
            status: status.into(),
        }
    }

    pub fn idle() -> Self {
        Self::new(0.0, "")
    }
}

pub type ProgressCallback = Arc<dyn Fn(LoadProgress) + Send + Sync>;

/// Assembled prompt ready for tokenization.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PromptHistory {
    pub messages: Vec<ChatMessage>,
}

/// Tokenized model input.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PreparedInput {
    pub tokens: Vec<TokenId>,
}

/// What the streaming compute call returns once the stream ends.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunResult {
    /// Decoded text of every token produced
    pub output: String,
    pub token_count: usize,
}

/// Static lookup of models the runtime can load.
pub trait ModelCatalog: Send + Sync {
    fn lookup(&self, id: &str) -> Option<ModelConfig>;
}

/// Loads model weights and tokenizer into a ready handle.
#[async_trait]
pub trait ModelRuntime: Send + Sync {
    /// Materializes `config`, reporting fractional progress through `on_progress`.
    async fn load(
        &self,
        config: &ModelConfig,
        on_progress: ProgressCallback,
    ) -> Result<Arc<dyn ModelHandle>>;
}

/// A fully materialized model plus its tokenizer/processor.
///
/// `streaming_generate` blocks for the whole run and is executed off the
/// async executor.
pub trait ModelHandle: Send + Sync {
    fn config(&self) -> &ModelConfig;

    fn model_id(&self) -> &str {
        &self.config().id
    }

    /// Re-seeds the sampler's pseudo-random generator.
    fn reseed(&self, seed: u64);

    fn prepare(&self, prompt: &PromptHistory) -> Result<PreparedInput>;

    fn decode(&self, tokens: &[TokenId]) -> String;

    /// Runs compute, invoking `on_tokens` with every token produced so far
    /// until it answers [`TokenDecision::Stop`] or the model finishes.
    fn streaming_generate(
        &self,
        input: &PreparedInput,
        params: &GenerationParameters,
        on_tokens: &mut dyn FnMut(&[TokenId]) -> TokenDecision,
    ) -> Result<RunResult>;
}

/// Turns a conversation into the prompt form the model expects.
#[async_trait]
pub trait PromptAssembler: Send + Sync {
    async fn prompt_history(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<PromptHistory>;
}

/// Prepends the system prompt (if any) to the conversation.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainPromptAssembler;

#[async_trait]
impl PromptAssembler for PlainPromptAssembler {
    async fn prompt_history(
        &self,
        messages: &[ChatMessage],
        system_prompt: &str,
    ) -> Result<PromptHistory> {
        let mut assembled = Vec::with_capacity(messages.len() + 1);
        if !system_prompt.trim().is_empty() {
            assembled.push(ChatMessage::new(MessageRole::System, system_prompt));
        }
        assembled.extend_from_slice(messages);
        Ok(PromptHistory {
            messages: assembled,
        })
    }
}

/// Source of the per-call sampler seed.
pub trait SeedSource: Send + Sync {
    fn next_seed(&self) -> u64;
}

/// Seeds from the wall clock, so identical prompts produce different output.
#[derive(Debug, Default, Clone, Copy)]
pub struct WallClockSeed;

impl SeedSource for WallClockSeed {
    fn next_seed(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default()
    }
}

/// Always returns the same seed.
#[derive(Debug, Clone, Copy)]
pub struct FixedSeed(pub u64);

impl SeedSource for FixedSeed {
    fn next_seed(&self) -> u64 {
        self.0
    }
}
