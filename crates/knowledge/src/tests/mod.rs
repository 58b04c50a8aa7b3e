//! Test doubles shared by the knowledge crate's unit tests.


use crate::embeddings::EmbeddingProvider;
use crate::types::{DocumentChunk, ScoredChunk};
use chrono::{TimeZone, Utc};
use medrag_core::{AppError, AppResult};
use medrag_llm::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A chunk indexed on day `day` of January 2024.
pub(crate) fn chunk(id: &str, source: &str, embedding: Vec<f32>, day: u32) -> DocumentChunk {
    DocumentChunk {
        id: id.to_string(),
        source_document: source.to_string(),
        section: Some("page 1".to_string()),
        position: 0,
        text: format!("Guideline passage {}", id),
        embedding,
        indexed_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
    }
}

pub(crate) fn scored(id: &str, score: f32) -> ScoredChunk {
    ScoredChunk {
        chunk: Arc::new(chunk(id, &format!("{}.txt", id), vec![1.0], 1)),
        score,
    }
}

/// Embeds every text as the same vector.
#[derive(Debug)]
pub(crate) struct FixedEmbedder {
    vector: Vec<f32>,
    fail: bool,
}

impl FixedEmbedder {
    pub(crate) fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            vector: Vec::new(),
            fail: true,
        }
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for FixedEmbedder {
    fn provider_name(&self) -> &str {
        "fixed"
    }

    fn model_name(&self) -> &str {
        "fixed"
    }

    fn dimensions(&self) -> usize {
        self.vector.len()
    }

    async fn embed_batch(&self, texts: &[String]) -> AppResult<Vec<Vec<f32>>> {
        if self.fail {
            return Err(AppError::Llm("embedding service unreachable".to_string()));
        }
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}

/// Language model that replays fixed fragments.
///
/// Counts calls and concurrently open streams, and records every prompt.
pub(crate) struct ScriptedLlm {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    unavailable_calls: usize,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLlm {
    pub(crate) fn new(fragments: Vec<&str>) -> Self {
        Self {
            fragments: fragments.into_iter().map(String::from).collect(),
            fail_after: None,
            unavailable_calls: 0,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every call fails before streaming.
    pub(crate) fn unavailable() -> Self {
        Self::new(vec!["unused"]).unavailable_for(usize::MAX)
    }

    /// The first `calls` calls fail before streaming.
    pub(crate) fn unavailable_for(mut self, calls: usize) -> Self {
        self.unavailable_calls = calls;
        self
    }

    /// The stream errors after emitting `fragments` fragments.
    pub(crate) fn failing_after(mut self, fragments: usize) -> Self {
        self.fail_after = Some(fragments);
        self
    }

    /// Sleep before every stream item.
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub(crate) fn active(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.active)
    }

    pub(crate) fn max_active(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.max_active)
    }

    pub(crate) fn prompts(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }

    fn usage(&self) -> LlmUsage {
        LlmUsage::new(42, self.fragments.len() as u32)
    }
}

struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>, max_active: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        max_active.fetch_max(now, Ordering::SeqCst);
        Self { active }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Script {
    fragments: Vec<String>,
    next: usize,
    fail_after: Option<usize>,
    delay: Duration,
    usage: LlmUsage,
    finished: bool,
    _active: ActiveGuard,
}

#[async_trait::async_trait]
impl LlmClient for ScriptedLlm {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        Ok(LlmResponse {
            content: self.fragments.concat(),
            model: request.model.clone(),
            usage: self.usage(),
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.unavailable_calls {
            return Err(AppError::Llm("connection refused".to_string()));
        }
        self.prompts.lock().unwrap().push(request.prompt.clone());

        let script = Script {
            fragments: self.fragments.clone(),
            next: 0,
            fail_after: self.fail_after,
            delay: self.delay,
            usage: self.usage(),
            finished: false,
            _active: ActiveGuard::new(Arc::clone(&self.active), &self.max_active),
        };

        Ok(Box::pin(futures::stream::unfold(script, |mut s| async move {
            if s.finished {
                return None;
            }
            if !s.delay.is_zero() {
                tokio::time::sleep(s.delay).await;
            }

            let item = if s.fail_after == Some(s.next) {
                s.finished = true;
                Err(AppError::Llm("stream reset by peer".to_string()))
            } else if let Some(text) = s.fragments.get(s.next) {
                s.next += 1;
                Ok(LlmStreamChunk::text(text.clone(), "scripted"))
            } else {
                s.finished = true;
                Ok(LlmStreamChunk::finished("scripted", Some(s.usage)))
            };
            Some((item, s))
        })))
    }
}
