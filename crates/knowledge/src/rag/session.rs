//! Conversation turns: retrieve, compose, stream, record.
//!
//! Each conversation runs one turn at a time, in submission order.
//! `submit_turn` takes a ticket from the conversation's queue; the turn waits
//! for its ticket to be served before retrieving and holds it until its
//! stream ends, is cancelled or is dropped. Other conversations proceed in
//! parallel.

use super::composer::{AnswerComposer, FragmentStream};
use super::retriever::Retriever;
use super::types::{Answer, AnswerFragment, ConversationId, Query, Turn, TurnPhase};
use crate::types::{RetrievalResult, TokenPricing};
use futures::{Stream, StreamExt};
use medrag_core::{AppError, AppResult};
use medrag_llm::LlmUsage;
use std::collections::{BTreeSet, HashMap};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Owns conversations and runs their turns.
pub struct SessionOrchestrator {
    retriever: Retriever,
    composer: AnswerComposer,
    top_k: usize,
    pricing: TokenPricing,
    conversations: Mutex<HashMap<ConversationId, Arc<Conversation>>>,
}

struct Conversation {
    queue: watch::Sender<TurnQueue>,
    turns: Mutex<Vec<Turn>>,
    phase: Mutex<TurnPhase>,
}

/// Ticket counter of a conversation. Exactly one ticket is served at a time.
#[derive(Debug, Default)]
struct TurnQueue {
    issued: u64,
    serving: u64,
    abandoned: BTreeSet<u64>,
}

impl TurnQueue {
    fn release(&mut self, ticket: u64) {
        if ticket == self.serving {
            self.serving += 1;
            while self.abandoned.remove(&self.serving) {
                self.serving += 1;
            }
        } else if ticket > self.serving {
            self.abandoned.insert(ticket);
        }
    }
}

// Nothing panics while these locks are held.
fn relock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Conversation {
    fn new() -> Self {
        Self {
            queue: watch::channel(TurnQueue::default()).0,
            turns: Mutex::new(Vec::new()),
            phase: Mutex::new(TurnPhase::default()),
        }
    }

    /// Reserve the next place in line.
    fn take_ticket(self: &Arc<Self>) -> TurnTicket {
        let mut number = 0;
        self.queue.send_if_modified(|queue| {
            number = queue.issued;
            queue.issued += 1;
            false
        });
        TurnTicket {
            conversation: Arc::clone(self),
            number,
        }
    }

    fn set_phase(&self, phase: TurnPhase) {
        *relock(&self.phase) = phase;
    }

    fn phase(&self) -> TurnPhase {
        *relock(&self.phase)
    }

    fn turns(&self) -> Vec<Turn> {
        relock(&self.turns).clone()
    }
}

impl SessionOrchestrator {
    pub fn new(retriever: Retriever, composer: AnswerComposer, top_k: usize) -> Self {
        Self {
            retriever,
            composer,
            top_k,
            pricing: TokenPricing::default(),
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Rates used for the per-turn cost estimate.
    pub fn with_pricing(mut self, pricing: TokenPricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Start a new, empty conversation.
    pub fn create_conversation(&self) -> ConversationId {
        let id = uuid::Uuid::new_v4().to_string();
        self.conversation(&id);
        tracing::debug!("Created conversation {}", id);
        id
    }

    /// Ids of all conversations, sorted.
    pub fn conversation_ids(&self) -> Vec<ConversationId> {
        let mut ids: Vec<_> = relock(&self.conversations).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Completed turns in submission order, or `None` for an unknown conversation.
    pub fn history(&self, conversation_id: &str) -> Option<Vec<Turn>> {
        relock(&self.conversations)
            .get(conversation_id)
            .map(|c| c.turns())
    }

    /// Forget a conversation and its history. Returns whether it existed.
    ///
    /// A turn already in flight finishes against the detached conversation.
    pub fn end_conversation(&self, conversation_id: &str) -> bool {
        let removed = relock(&self.conversations).remove(conversation_id).is_some();
        if removed {
            tracing::debug!("Ended conversation {}", conversation_id);
        }
        removed
    }

    /// Current phase, or `None` for an unknown conversation.
    pub fn phase(&self, conversation_id: &str) -> Option<TurnPhase> {
        relock(&self.conversations)
            .get(conversation_id)
            .map(|c| c.phase())
    }

    /// Submit a question. Nothing runs until the returned stream is polled,
    /// but the turn's place in the conversation is fixed now: it runs after
    /// every turn submitted before it.
    ///
    /// The stream yields answer text, then a final fragment with citations,
    /// or ends with a single error. An unknown conversation is created.
    pub fn submit_turn(&self, conversation_id: &str, text: impl Into<String>) -> TurnStream {
        let cancel = CancellationToken::new();
        let conversation = self.conversation(conversation_id);
        let ticket = conversation.take_ticket();
        let run = TurnRun {
            conversation,
            retriever: self.retriever.clone(),
            composer: self.composer.clone(),
            top_k: self.top_k,
            pricing: self.pricing,
            query: Query::new(conversation_id, text),
            cancel: cancel.clone(),
            started: Instant::now(),
            step: Step::Start(ticket),
        };

        let inner = futures::stream::unfold(run, |mut run| async move {
            let item = run.advance().await?;
            Some((item, run))
        });

        TurnStream {
            inner: Box::pin(inner),
            cancel,
        }
    }

    /// Run a turn to completion and return its answer.
    pub async fn answer(&self, conversation_id: &str, text: impl Into<String>) -> AppResult<Answer> {
        let mut stream = self.submit_turn(conversation_id, text);
        let mut answer = String::new();

        while let Some(fragment) = stream.next().await {
            match fragment? {
                AnswerFragment::Text { text } => answer.push_str(&text),
                AnswerFragment::Final { citations, .. } => {
                    return Ok(Answer {
                        text: answer,
                        citations,
                        conversation_id: conversation_id.to_string(),
                    })
                }
            }
        }

        Err(AppError::Generation(
            "answer stream ended without citations".to_string(),
        ))
    }

    fn conversation(&self, id: &str) -> Arc<Conversation> {
        Arc::clone(
            relock(&self.conversations)
                .entry(id.to_string())
                .or_insert_with(|| Arc::new(Conversation::new())),
        )
    }
}

/// Fragment stream of one turn.
///
/// Dropping it abandons the turn: generation stops and the conversation is
/// released without recording anything.
pub struct TurnStream {
    inner: Pin<Box<dyn Stream<Item = AppResult<AnswerFragment>> + Send>>,
    cancel: CancellationToken,
}

impl TurnStream {
    /// Abandon the turn. The stream yields [`AppError::Cancelled`] and ends.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this turn, for use from another task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for TurnStream {
    type Item = AppResult<AnswerFragment>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for TurnStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// A place in a conversation's turn queue. Dropping it, served or not,
/// lets the following turn run.
struct TurnTicket {
    conversation: Arc<Conversation>,
    number: u64,
}

impl TurnTicket {
    async fn served(&self) -> AppResult<()> {
        let mut queue = self.conversation.queue.subscribe();
        queue
            .wait_for(|q| q.serving == self.number)
            .await
            .map(|_| ())
            .map_err(|_| AppError::Other("conversation queue closed".to_string()))
    }
}

impl Drop for TurnTicket {
    fn drop(&mut self) {
        let number = self.number;
        self.conversation.queue.send_modify(|q| q.release(number));
    }
}

/// Holds the conversation for the duration of a turn.
///
/// A turn dropped before it settles leaves the conversation idle.
struct TurnGuard {
    conversation: Arc<Conversation>,
    settled: bool,
    _ticket: TurnTicket,
}

impl TurnGuard {
    fn complete(mut self, turn: Turn) {
        relock(&self.conversation.turns).push(turn);
        self.conversation.set_phase(TurnPhase::Idle);
        self.settled = true;
    }

    fn fail(mut self) {
        self.conversation.set_phase(TurnPhase::Failed);
        self.settled = true;
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        if !self.settled {
            self.conversation.set_phase(TurnPhase::Idle);
        }
    }
}

enum Step {
    Start(TurnTicket),
    Streaming {
        guard: TurnGuard,
        fragments: FragmentStream,
        retrieved: RetrievalResult,
        text: String,
    },
    Done,
}

struct TurnRun {
    conversation: Arc<Conversation>,
    retriever: Retriever,
    composer: AnswerComposer,
    top_k: usize,
    pricing: TokenPricing,
    query: Query,
    cancel: CancellationToken,
    started: Instant,
    step: Step,
}

impl TurnRun {
    async fn advance(&mut self) -> Option<AppResult<AnswerFragment>> {
        loop {
            match std::mem::replace(&mut self.step, Step::Done) {
                Step::Done => return None,

                Step::Start(ticket) => match self.begin(ticket).await {
                    Ok(step) => self.step = step,
                    Err(e) => return Some(Err(e)),
                },

                Step::Streaming {
                    guard,
                    mut fragments,
                    retrieved,
                    mut text,
                } => {
                    let next = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            tracing::info!("Turn cancelled in conversation {}", self.query.conversation_id);
                            return Some(Err(AppError::Cancelled));
                        }
                        next = fragments.next() => next,
                    };

                    match next {
                        Some(Ok(AnswerFragment::Text { text: fragment })) => {
                            text.push_str(&fragment);
                            self.step = Step::Streaming {
                                guard,
                                fragments,
                                retrieved,
                                text,
                            };
                            return Some(Ok(AnswerFragment::Text { text: fragment }));
                        }
                        Some(Ok(AnswerFragment::Final { citations, usage })) => {
                            self.log_metrics(&retrieved, &text, usage);
                            guard.complete(Turn {
                                query: self.query.clone(),
                                answer: Answer {
                                    text,
                                    citations: citations.clone(),
                                    conversation_id: self.query.conversation_id.clone(),
                                },
                            });
                            return Some(Ok(AnswerFragment::Final { citations, usage }));
                        }
                        Some(Err(e)) => {
                            tracing::warn!("Turn failed while streaming: {}", e);
                            guard.fail();
                            return Some(Err(e));
                        }
                        None => {
                            guard.fail();
                            return Some(Err(AppError::Generation(
                                "answer stream ended without citations".to_string(),
                            )));
                        }
                    }
                }
            }
        }
    }

    /// Wait for the turn's ticket, retrieve and start composing.
    async fn begin(&mut self, ticket: TurnTicket) -> AppResult<Step> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
            served = ticket.served() => served?,
        };
        let guard = TurnGuard {
            conversation: Arc::clone(&self.conversation),
            settled: false,
            _ticket: ticket,
        };

        // Measure from the moment the turn owns the conversation.
        self.started = Instant::now();
        let history = self.conversation.turns();

        self.conversation.set_phase(TurnPhase::Retrieving);
        let retrieved = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AppError::Cancelled),
            retrieved = self.retriever.retrieve_with_history(&self.query, &history, self.top_k) => retrieved,
        };
        let retrieved = match retrieved {
            Ok(retrieved) => retrieved,
            Err(e) => {
                tracing::warn!("Retrieval failed: {}", e);
                guard.fail();
                return Err(e);
            }
        };

        self.conversation.set_phase(TurnPhase::Composing);
        let fragments = match self
            .composer
            .compose_with_history(&self.query, &retrieved, &history)
        {
            Ok(fragments) => fragments,
            Err(e) => {
                tracing::info!("Turn not answered: {}", e);
                guard.fail();
                return Err(e);
            }
        };

        self.conversation.set_phase(TurnPhase::Streaming);
        Ok(Step::Streaming {
            guard,
            fragments,
            retrieved,
            text: String::new(),
        })
    }

    fn log_metrics(&self, retrieved: &RetrievalResult, answer: &str, usage: Option<LlmUsage>) {
        let avg_score = if retrieved.is_empty() {
            0.0
        } else {
            retrieved.iter().map(|r| r.score).sum::<f32>() / retrieved.len() as f32
        };
        // Word counts stand in for backends that report no usage.
        let usage = usage.unwrap_or_else(|| {
            LlmUsage::new(
                self.query.text.split_whitespace().count() as u32,
                answer.split_whitespace().count() as u32,
            )
        });

        tracing::info!(
            conversation_id = %self.query.conversation_id,
            latency_ms = self.started.elapsed().as_millis() as u64,
            retrieved = retrieved.len(),
            avg_score = avg_score as f64,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            estimated_cost_usd = self.pricing.estimate(&usage),
            prompt_id = %self.composer.prompt_id(),
            "Turn completed"
        );
    }
}
