//! In-memory fakes for the core's ports, shared by the unit tests.

use std::collections::VecDeque;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use futures_util::Stream;
use pagepilot_types::chat::TabId;
use pagepilot_types::error::{PageError, RepositoryError, RetrievalError};
use pagepilot_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, ProviderKind, StopReason,
    StreamEvent, ToolCall, Usage,
};
use pagepilot_types::page::PageContent;
use secrecy::SecretString;
use serde_json::Value;
use tokio::sync::Notify;

use crate::credentials::{CredentialProvider, Credentials, ProviderFactory};
use crate::llm::box_provider::BoxLlmProvider;
use crate::llm::provider::LlmProvider;
use crate::page::{PageActions, PageContentProvider};
use crate::retrieval::embedder::Embedder;
use crate::storage::kv_store::KvStore;

// --- KV store ---

pub struct MockKvStore {
    entries: DashMap<(String, String), Value>,
    failing_writes: AtomicUsize,
}

impl MockKvStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            failing_writes: AtomicUsize::new(0),
        }
    }

    /// Make the next `count` calls to `set` fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }
}

impl KvStore for MockKvStore {
    async fn get(&self, namespace: &str, key: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self
            .entries
            .get(&(namespace.to_string(), key.to_string()))
            .map(|e| e.value().clone()))
    }

    async fn set(&self, namespace: &str, key: &str, value: &Value) -> Result<(), RepositoryError> {
        if self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RepositoryError::Connection);
        }
        let id = (namespace.to_string(), key.to_string());
        if value.is_null() {
            self.entries.remove(&id);
        } else {
            self.entries.insert(id, value.clone());
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> Result<(), RepositoryError> {
        self.entries.remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}

// --- Embedder ---

const MOCK_DIMENSION: usize = 512;

/// Bag-of-words embedder: texts sharing words have positive similarity.
pub struct MockEmbedder {
    offline: Arc<AtomicBool>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self {
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing() -> Self {
        Self {
            offline: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Flag that makes every later `embed` call fail once set, usable after
    /// the embedder has been boxed.
    pub fn offline_switch(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.offline)
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; MOCK_DIMENSION];
        let lowered = text.to_lowercase();
        for word in lowered.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let mut hasher = DefaultHasher::new();
            word.hash(&mut hasher);
            v[(hasher.finish() % MOCK_DIMENSION as u64) as usize] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RetrievalError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RetrievalError::Embedding("mock embedder offline".to_string()));
        }
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-bag-of-words"
    }

    fn dimension(&self) -> usize {
        MOCK_DIMENSION
    }
}

// --- Page collaborators ---

/// A single page attached to one tab.
pub struct FakePage {
    page: PageContent,
}

impl FakePage {
    pub fn with_text(tab: &str, url: &str, text: &str) -> Self {
        Self {
            page: PageContent {
                id: TabId::from(tab),
                url: url.to_string(),
                title: "Acme".to_string(),
                content: text.to_string(),
            },
        }
    }
}

impl PageContentProvider for FakePage {
    async fn page_content(&self, tab: &TabId) -> Result<PageContent, PageError> {
        if *tab == self.page.id {
            Ok(self.page.clone())
        } else {
            Err(PageError::NoPage(tab.to_string()))
        }
    }
}

/// Records each successful action; selectors containing "missing" fail.
pub struct RecordingActions {
    calls: Mutex<Vec<String>>,
}

impl RecordingActions {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<String, PageError> {
        self.calls.lock().unwrap().push(call.clone());
        Ok(format!("ok: {call}"))
    }

    fn check(selector: &str) -> Result<(), PageError> {
        if selector.contains("missing") {
            Err(PageError::SelectorNotFound(selector.to_string()))
        } else {
            Ok(())
        }
    }
}

impl PageActions for RecordingActions {
    async fn navigate(&self, _tab: &TabId, url: &str) -> Result<String, PageError> {
        self.record(format!("navigate {url}"))
    }

    async fn click(&self, _tab: &TabId, selector: &str) -> Result<String, PageError> {
        Self::check(selector)?;
        self.record(format!("click {selector}"))
    }

    async fn type_text(&self, _tab: &TabId, selector: &str, text: &str) -> Result<String, PageError> {
        Self::check(selector)?;
        self.record(format!("type_text {selector} {text}"))
    }

    async fn execute_script(&self, _tab: &TabId, script: &str) -> Result<String, PageError> {
        self.record(format!("execute_script {script}"))
    }

    async fn go_back(&self, _tab: &TabId) -> Result<String, PageError> {
        self.record("go_back".to_string())
    }

    async fn go_forward(&self, _tab: &TabId) -> Result<String, PageError> {
        self.record("go_forward".to_string())
    }

    async fn validate_selector(&self, _tab: &TabId, selector: &str) -> Result<String, PageError> {
        Self::check(selector)?;
        self.record(format!("validate_selector {selector}"))
    }
}

// --- Model provider ---

pub fn text_response(text: &str) -> CompletionResponse {
    CompletionResponse {
        id: "resp-text".to_string(),
        content: text.to_string(),
        model: "test-model".to_string(),
        stop_reason: StopReason::EndTurn,
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
        },
        tool_calls: Vec::new(),
    }
}

pub fn tool_response(calls: Vec<(&str, Value)>) -> CompletionResponse {
    CompletionResponse {
        id: "resp-tools".to_string(),
        content: String::new(),
        model: "test-model".to_string(),
        stop_reason: StopReason::ToolUse,
        usage: Usage {
            input_tokens: 10,
            output_tokens: 5,
        },
        tool_calls: calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, arguments))| ToolCall {
                id: format!("call-{name}-{i}"),
                name: name.to_string(),
                arguments,
            })
            .collect(),
    }
}

struct ScriptState {
    script: Mutex<VecDeque<CompletionResponse>>,
    fallback: Option<CompletionResponse>,
    fail: bool,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
    requests: Mutex<Vec<CompletionRequest>>,
    capabilities: ProviderCapabilities,
}

/// Replays queued responses, then the fallback, then a plain "done".
///
/// Clones share the script and the request log.
#[derive(Clone)]
pub struct ScriptedProvider {
    state: Arc<ScriptState>,
}

impl ScriptedProvider {
    fn build(
        script: Vec<CompletionResponse>,
        fallback: Option<CompletionResponse>,
        fail: bool,
        gate: Option<(Arc<Notify>, Arc<Notify>)>,
    ) -> Self {
        Self {
            state: Arc::new(ScriptState {
                script: Mutex::new(script.into()),
                fallback,
                fail,
                gate,
                requests: Mutex::new(Vec::new()),
                capabilities: ProviderCapabilities {
                    streaming: true,
                    tool_calling: true,
                    max_context_tokens: 128_000,
                    max_output_tokens: 4_096,
                },
            }),
        }
    }

    pub fn new(script: Vec<CompletionResponse>) -> Self {
        Self::build(script, None, false, None)
    }

    /// A model that requests the same tool call forever.
    pub fn always_calling(tool: &str, arguments: Value) -> Self {
        Self::build(Vec::new(), Some(tool_response(vec![(tool, arguments)])), false, None)
    }

    pub fn failing() -> Self {
        Self::build(Vec::new(), None, true, None)
    }

    /// Signals `entered` on each call, then waits for `release` before answering.
    pub fn gated(script: Vec<CompletionResponse>, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self::build(script, None, false, Some((entered, release)))
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.state.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.state.requests.lock().unwrap().push(request.clone());
        if let Some((entered, release)) = &self.state.gate {
            entered.notify_one();
            release.notified().await;
        }
        if self.state.fail {
            return Err(LlmError::Provider {
                message: "scripted failure".to_string(),
            });
        }
        let next = self.state.script.lock().unwrap().pop_front();
        Ok(next
            .or_else(|| self.state.fallback.clone())
            .unwrap_or_else(|| text_response("done")))
    }

    fn stream(
        &self,
        _request: CompletionRequest,
    ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
        Box::pin(futures_util::stream::iter(vec![
            Ok(StreamEvent::Connected),
            Ok(StreamEvent::TextDelta {
                text: "done".to_string(),
            }),
            Ok(StreamEvent::Done),
        ]))
    }
}

// --- Credentials ---

/// Clones share the API key, so a test can rotate it mid-run.
#[derive(Clone)]
pub struct StaticCredentials {
    configured: bool,
    api_key: Arc<Mutex<String>>,
}

impl StaticCredentials {
    pub fn configured() -> Self {
        Self {
            configured: true,
            api_key: Arc::new(Mutex::new("test-key".to_string())),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            api_key: Arc::new(Mutex::new(String::new())),
        }
    }

    pub fn rotate_key(&self, key: &str) {
        *self.api_key.lock().unwrap() = key.to_string();
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> Credentials {
        if !self.configured {
            return Credentials::unconfigured();
        }
        Credentials {
            configured: true,
            provider: ProviderKind::OpenAi,
            model: "test-model".to_string(),
            api_key: Some(SecretString::from(self.api_key.lock().unwrap().clone())),
            base_url: None,
        }
    }
}

/// Hands out clones of one scripted provider and counts attempts.
pub struct FakeFactory {
    provider: Option<ScriptedProvider>,
    created: AtomicUsize,
}

impl FakeFactory {
    pub fn new(provider: ScriptedProvider) -> Self {
        Self {
            provider: Some(provider),
            created: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            provider: None,
            created: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ProviderFactory for FakeFactory {
    fn create(&self, _credentials: &Credentials) -> Result<BoxLlmProvider, LlmError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        match &self.provider {
            Some(provider) => Ok(BoxLlmProvider::new(provider.clone())),
            None => Err(LlmError::AuthenticationFailed),
        }
    }
}
