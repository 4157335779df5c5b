use super::*;
use async_trait::async_trait;
use hearth_core::config::{GenerationParameters, ModelConfig, ModelType};
use hearth_core::conversation::{ChatMessage, ConversationMessage, MessageRole};
use hearth_core::runtime::{
    FixedSeed, ModelHandle, ModelRuntime, PlainPromptAssembler, PreparedInput, ProgressCallback,
    PromptHistory, RunResult,
};
use hearth_infrastructure::StaticModelCatalog;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;

const CHAT_MODEL: &str = "chat-model";
const REASONING_MODEL: &str = "reasoning-model";
const SLOW_MODEL: &str = "slow-model";
const ENDLESS_MODEL: &str = "endless-model";
const BROKEN_MODEL: &str = "broken-model";

/// Emits random letters one token at a time.
struct MockHandle {
    config: ModelConfig,
    natural_len: usize,
    token_delay: Duration,
    fail: bool,
    rng: Mutex<StdRng>,
    seeds: Mutex<Vec<u64>>,
    decoded_lengths: Mutex<Vec<usize>>,
    runs: AtomicUsize,
    in_flight: AtomicUsize,
    /// Calls that started while another was still computing
    overlaps: AtomicUsize,
}

impl MockHandle {
    fn new(id: &str, model_type: ModelType, natural_len: usize) -> Self {
        Self {
            config: ModelConfig::new(id, model_type),
            natural_len,
            token_delay: Duration::ZERO,
            fail: false,
            rng: Mutex::new(StdRng::seed_from_u64(0)),
            seeds: Mutex::new(Vec::new()),
            decoded_lengths: Mutex::new(Vec::new()),
            runs: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            overlaps: AtomicUsize::new(0),
        }
    }

    fn slow(mut self) -> Self {
        self.token_delay = Duration::from_millis(2);
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

fn render(tokens: &[TokenId]) -> String {
    tokens
        .iter()
        .map(|t| char::from(b'a' + (*t % 26) as u8))
        .collect()
}

impl ModelHandle for MockHandle {
    fn config(&self) -> &ModelConfig {
        &self.config
    }

    fn reseed(&self, seed: u64) {
        self.seeds.lock().unwrap().push(seed);
        *self.rng.lock().unwrap() = StdRng::seed_from_u64(seed);
    }

    fn prepare(&self, prompt: &PromptHistory) -> Result<PreparedInput> {
        let tokens = prompt
            .messages
            .iter()
            .flat_map(|m| m.content.bytes().map(TokenId::from))
            .collect();
        Ok(PreparedInput { tokens })
    }

    /// Only the orchestrator decodes, and only when it publishes.
    fn decode(&self, tokens: &[TokenId]) -> String {
        self.decoded_lengths.lock().unwrap().push(tokens.len());
        render(tokens)
    }

    fn streaming_generate(
        &self,
        _input: &PreparedInput,
        params: &GenerationParameters,
        on_tokens: &mut dyn FnMut(&[TokenId]) -> TokenDecision,
    ) -> Result<RunResult> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        assert_eq!(params.temperature, 0.5);
        if self.fail {
            return Err(HearthError::generation("kernel fault"));
        }
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }

        let mut rng = self.rng.lock().unwrap();
        let mut tokens: Vec<TokenId> = Vec::new();
        while tokens.len() < self.natural_len {
            tokens.push(rng.gen_range(0..26));
            if !self.token_delay.is_zero() {
                std::thread::sleep(self.token_delay);
            }
            if on_tokens(&tokens) == TokenDecision::Stop {
                break;
            }
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        Ok(RunResult {
            output: render(&tokens),
            token_count: tokens.len(),
        })
    }
}

struct MockRuntime {
    handles: HashMap<String, Arc<MockHandle>>,
}

#[async_trait]
impl ModelRuntime for MockRuntime {
    async fn load(
        &self,
        config: &ModelConfig,
        on_progress: ProgressCallback,
    ) -> Result<Arc<dyn ModelHandle>> {
        on_progress(hearth_core::runtime::LoadProgress::new(1.0, "ready"));
        let handle = self
            .handles
            .get(&config.id)
            .cloned()
            .ok_or_else(|| HearthError::load(format!("no weights for {}", config.id)))?;
        Ok(handle)
    }
}

struct FailingAssembler;

#[async_trait]
impl PromptAssembler for FailingAssembler {
    async fn prompt_history(
        &self,
        _messages: &[ChatMessage],
        _system_prompt: &str,
    ) -> Result<PromptHistory> {
        Err(HearthError::PromptAssembly("template missing".to_string()))
    }
}

struct Fixture {
    handles: HashMap<String, Arc<MockHandle>>,
    session: Arc<InferenceSessionManager>,
}

impl Fixture {
    fn new() -> Self {
        let handles: HashMap<String, Arc<MockHandle>> = [
            MockHandle::new(CHAT_MODEL, ModelType::Regular, 10),
            MockHandle::new(REASONING_MODEL, ModelType::Reasoning, usize::MAX).slow(),
            MockHandle::new(SLOW_MODEL, ModelType::Regular, usize::MAX).slow(),
            MockHandle::new(ENDLESS_MODEL, ModelType::Regular, usize::MAX),
            MockHandle::new(BROKEN_MODEL, ModelType::Regular, 10).failing(),
        ]
        .into_iter()
        .map(|h| (h.config.id.clone(), Arc::new(h)))
        .collect();

        let catalog = StaticModelCatalog::empty()
            .with_models(handles.values().map(|h| h.config.clone()));
        let runtime = MockRuntime {
            handles: handles.clone(),
        };
        let session = Arc::new(InferenceSessionManager::new(
            Arc::new(catalog),
            Arc::new(runtime),
        ));

        Self { handles, session }
    }

    fn orchestrator(&self) -> GenerationOrchestrator {
        GenerationOrchestrator::new(Arc::clone(&self.session), Arc::new(PlainPromptAssembler))
    }

    fn handle(&self, id: &str) -> &MockHandle {
        &self.handles[id]
    }
}

fn conversation() -> Vec<ConversationMessage> {
    vec![ConversationMessage {
        role: MessageRole::User,
        content: "hello there".to_string(),
        timestamp: "2026-01-01T00:00:00Z".to_string(),
    }]
}

/// Waits until the published snapshot satisfies `ready`.
async fn wait_for(
    rx: &mut watch::Receiver<GenerationSnapshot>,
    ready: impl Fn(&GenerationSnapshot) -> bool,
) -> GenerationSnapshot {
    loop {
        {
            let current = rx.borrow_and_update();
            if ready(&current) {
                return current.clone();
            }
        }
        rx.changed().await.unwrap();
    }
}

#[tokio::test]
async fn test_generate_completes() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();

    let output = orchestrator
        .generate(CHAT_MODEL, &conversation(), "You are terse.")
        .await
        .unwrap();

    assert_eq!(output.status, GenerationStatus::Completed);
    assert_eq!(output.token_count, 10);
    assert!(!output.text.is_empty());
    assert!(output.tokens_per_second >= 0.0);
    assert_eq!(fixture.handle(CHAT_MODEL).runs.load(Ordering::SeqCst), 1);
    assert!(fixture.session.state().handle_for(CHAT_MODEL).is_some());

    let snapshot = orchestrator.snapshot();
    assert!(!snapshot.running);
    assert_eq!(snapshot.output, output.text);
    assert!(!orchestrator.is_running());
}

#[tokio::test]
async fn test_partials_are_throttled_and_final_output_published() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();

    let output = orchestrator
        .generate(CHAT_MODEL, &conversation(), "")
        .await
        .unwrap();

    // 10 tokens: published at 4 and 8 only
    assert_eq!(
        *fixture.handle(CHAT_MODEL).decoded_lengths.lock().unwrap(),
        vec![4, 8]
    );
    // The final two tokens reach observers through the closing publish
    assert_eq!(orchestrator.snapshot().output, output.text);
    assert_eq!(orchestrator.snapshot().token_count, 10);
}

#[tokio::test]
async fn test_token_cap_is_enforced() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();

    let output = orchestrator
        .generate(ENDLESS_MODEL, &conversation(), "")
        .await
        .unwrap();

    assert_eq!(output.token_count, 4096);
    assert_eq!(output.status, GenerationStatus::Completed);
    let decoded = fixture.handle(ENDLESS_MODEL).decoded_lengths.lock().unwrap();
    assert!(decoded.iter().all(|len| *len <= 4096 && len % 4 == 0));
}

#[tokio::test]
async fn test_custom_cap_and_interval() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator().with_settings(GenerationSettings {
        max_tokens: 9,
        publish_interval: 3,
        ..GenerationSettings::default()
    });

    let output = orchestrator
        .generate(ENDLESS_MODEL, &conversation(), "")
        .await
        .unwrap();

    assert_eq!(output.token_count, 9);
    assert_eq!(
        *fixture.handle(ENDLESS_MODEL).decoded_lengths.lock().unwrap(),
        vec![3, 6, 9]
    );
}

#[tokio::test]
async fn test_unknown_model_fails_visibly() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();

    let err = orchestrator
        .generate("missing-model", &conversation(), "")
        .await
        .unwrap_err();

    assert!(err.is_model_not_found());
    let snapshot = orchestrator.snapshot();
    assert!(snapshot.output.starts_with("Failed:"));
    assert!(snapshot.output.contains("missing-model"));
    assert!(!snapshot.running);
    assert!(!orchestrator.is_running());
}

#[tokio::test]
async fn test_compute_failure_clears_running() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();

    let err = orchestrator
        .generate(BROKEN_MODEL, &conversation(), "")
        .await
        .unwrap_err();

    assert!(matches!(err, HearthError::Generation(_)));
    assert!(orchestrator.snapshot().output.starts_with("Failed: "));
    assert!(!orchestrator.is_running());

    // The guard is released; the next call runs normally
    let output = orchestrator
        .generate(CHAT_MODEL, &conversation(), "")
        .await
        .unwrap();
    assert_eq!(output.status, GenerationStatus::Completed);
}

#[tokio::test]
async fn test_prompt_assembly_failure() {
    let fixture = Fixture::new();
    let orchestrator =
        GenerationOrchestrator::new(Arc::clone(&fixture.session), Arc::new(FailingAssembler));

    let err = orchestrator
        .generate(CHAT_MODEL, &conversation(), "")
        .await
        .unwrap_err();

    assert!(matches!(err, HearthError::PromptAssembly(_)));
    assert_eq!(fixture.handle(CHAT_MODEL).runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_second_call_is_rejected_while_running() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();
    let mut rx = orchestrator.subscribe();
    let messages = conversation();

    let (first, (second, before, after)) = tokio::join!(
        orchestrator.generate(SLOW_MODEL, &messages, ""),
        async {
            wait_for(&mut rx, |s| s.token_count >= 4).await;
            let before = orchestrator.snapshot();
            let rejected = orchestrator.generate(CHAT_MODEL, &messages, "").await;
            let after = orchestrator.snapshot();
            assert!(!orchestrator.cancelled.load(Ordering::SeqCst));
            assert!(orchestrator.is_running());
            orchestrator.stop();
            (rejected, before, after)
        }
    );

    assert!(before.running);
    assert_eq!(before, after);
    let second = second.unwrap();
    assert_eq!(second.status, GenerationStatus::Rejected);
    assert!(second.text.is_empty());
    // The active run was left alone until stopped
    assert_eq!(first.unwrap().status, GenerationStatus::Cancelled);
    assert_eq!(fixture.handle(CHAT_MODEL).runs.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.handle(SLOW_MODEL).runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stop_yields_consistent_prefix() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();
    let mut rx = orchestrator.subscribe();
    let messages = conversation();

    let (output, partial) = tokio::join!(
        orchestrator.generate(SLOW_MODEL, &messages, ""),
        async {
            let partial = wait_for(&mut rx, |s| s.token_count >= 8).await;
            orchestrator.stop();
            partial
        }
    );

    let output = output.unwrap();
    assert_eq!(output.status, GenerationStatus::Cancelled);
    assert!(output.token_count < 4096);
    assert!(output.token_count >= partial.token_count);
    assert_eq!(output.text.len(), output.token_count);
    assert!(output.text.starts_with(&partial.output));
    assert_eq!(orchestrator.snapshot().output, output.text);
}

#[tokio::test]
async fn test_reasoning_model_sets_thinking() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();
    let mut rx = orchestrator.subscribe();
    let messages = conversation();

    let (output, thinking) = tokio::join!(
        orchestrator.generate(REASONING_MODEL, &messages, ""),
        async {
            let seen = wait_for(&mut rx, |s| s.is_thinking).await;
            orchestrator.stop();
            seen.is_thinking
        }
    );

    assert!(thinking);
    assert_eq!(output.unwrap().status, GenerationStatus::Cancelled);
    assert!(!orchestrator.snapshot().is_thinking);
}

#[tokio::test]
async fn test_regular_model_never_thinks() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();
    let mut rx = orchestrator.subscribe();

    orchestrator
        .generate(CHAT_MODEL, &conversation(), "")
        .await
        .unwrap();

    assert!(!rx.borrow_and_update().is_thinking);
}

#[tokio::test]
async fn test_seed_source_feeds_every_run() {
    let fixture = Fixture::new();
    let orchestrator = fixture
        .orchestrator()
        .with_seed_source(Arc::new(FixedSeed(42)));

    let first = orchestrator
        .generate(CHAT_MODEL, &conversation(), "")
        .await
        .unwrap();
    let second = orchestrator
        .generate(CHAT_MODEL, &conversation(), "")
        .await
        .unwrap();

    assert_eq!(first.text, second.text);
    assert_eq!(*fixture.handle(CHAT_MODEL).seeds.lock().unwrap(), vec![42, 42]);
}

#[tokio::test]
async fn test_wall_clock_seeds_differ() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();

    orchestrator
        .generate(CHAT_MODEL, &conversation(), "")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    orchestrator
        .generate(CHAT_MODEL, &conversation(), "")
        .await
        .unwrap();

    let seeds = fixture.handle(CHAT_MODEL).seeds.lock().unwrap().clone();
    assert_eq!(seeds.len(), 2);
    assert_ne!(seeds[0], seeds[1]);
}

#[tokio::test]
async fn test_abandoned_generate_stops_compute_before_next_run() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator();
    let mut rx = orchestrator.subscribe();
    let messages = conversation();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(60),
        orchestrator.generate(SLOW_MODEL, &messages, ""),
    )
    .await;
    assert!(abandoned.is_err());

    // The flag stays up until the compute thread has returned
    wait_for(&mut rx, |s| !s.running).await;
    assert!(!orchestrator.is_running());
    let handle = fixture.handle(SLOW_MODEL);
    assert_eq!(handle.in_flight.load(Ordering::SeqCst), 0);

    let decoded = handle.decoded_lengths.lock().unwrap().clone();
    assert!(decoded.iter().all(|len| *len < 4096));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*handle.decoded_lengths.lock().unwrap(), decoded);

    let (next, _) = tokio::join!(
        orchestrator.generate(SLOW_MODEL, &messages, ""),
        async {
            wait_for(&mut rx, |s| s.running && s.token_count >= 4).await;
            orchestrator.stop();
        }
    );

    assert_eq!(next.unwrap().status, GenerationStatus::Cancelled);
    assert_eq!(handle.runs.load(Ordering::SeqCst), 2);
    assert_eq!(handle.overlaps.load(Ordering::SeqCst), 0);
}
