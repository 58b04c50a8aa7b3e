//! Retrieval-augmented answering over a knowledge base.
//!
//! A turn flows through three components:
//! [`Retriever`] ranks stored chunks for the question,
//! [`AnswerComposer`] prompts the language model with them and streams a
//! cited answer, and [`SessionOrchestrator`] sequences turns per
//! conversation and keeps their history.

pub mod citations;
pub mod composer;
pub mod retriever;
pub mod session;
pub mod types;

pub use composer::{AnswerComposer, FragmentStream};
pub use retriever::Retriever;
pub use session::{SessionOrchestrator, TurnStream};
pub use types::{
    Answer, AnswerFragment, Citation, ConversationId, Query, Turn, TurnPhase, MAX_SNIPPET_LENGTH,
};

use crate::types::KnowledgeBaseConfig;

/// Components opened for one knowledge base.
#[derive(Clone)]
pub struct RagPipeline {
    pub retriever: Retriever,
    pub composer: AnswerComposer,
    pub config: KnowledgeBaseConfig,
}

impl RagPipeline {
    /// A fresh orchestrator retrieving `top_k` chunks per turn.
    pub fn orchestrator(&self) -> SessionOrchestrator {
        SessionOrchestrator::new(
            self.retriever.clone(),
            self.composer.clone(),
            self.config.top_k as usize,
        )
        .with_pricing(self.config.pricing)
    }
}
