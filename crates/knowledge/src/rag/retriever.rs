//! Similarity retrieval over a document store.

use super::types::{Query, Turn};
use crate::embeddings::EmbeddingProvider;
use crate::store::DocumentStore;
use crate::types::RetrievalResult;
use medrag_core::{AppError, AppResult};
use std::sync::Arc;

/// Embeds queries and ranks stored chunks against them.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    min_score: Option<f32>,
    history_turns: usize,
}

impl Retriever {
    pub fn new(store: Arc<dyn DocumentStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            min_score: None,
            history_turns: 0,
        }
    }

    /// Drop results scoring below `min_score`.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = Some(min_score);
        self
    }

    /// Fold this many prior queries of the conversation into the embedded text.
    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    /// Top `k` chunks for `query`, highest score first.
    pub async fn retrieve(&self, query: &Query, k: usize) -> AppResult<RetrievalResult> {
        self.retrieve_with_history(query, &[], k).await
    }

    /// Like [`Retriever::retrieve`], refining the query with earlier turns.
    pub async fn retrieve_with_history(
        &self,
        query: &Query,
        history: &[Turn],
        k: usize,
    ) -> AppResult<RetrievalResult> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let count = self
            .store
            .count()
            .await
            .map_err(|e| AppError::Retrieval(format!("document store unavailable: {}", e)))?;
        if count == 0 {
            return Err(AppError::Retrieval("document store is empty".to_string()));
        }

        let text = self.embedding_text(query, history);
        let embedding = self
            .embedder
            .embed(&text)
            .await
            .map_err(|e| AppError::Retrieval(format!("failed to embed query: {}", e)))?;

        let mut results = self
            .store
            .search(&embedding, k)
            .await
            .map_err(|e| AppError::Retrieval(format!("search failed: {}", e)))?;

        let retrieved = results.len();
        if let Some(min_score) = self.min_score {
            results.retain(|r| r.score >= min_score);
        }
        results.truncate(k);

        match (results.first(), results.last()) {
            (Some(top), Some(lowest)) => tracing::debug!(
                "Retrieved {} chunks from '{}' (top score: {:.3}, lowest: {:.3})",
                results.len(),
                self.store.name(),
                top.score,
                lowest.score
            ),
            _ => tracing::info!(
                "No relevant chunks: {} candidates below the {:.2} threshold",
                retrieved,
                self.min_score.unwrap_or_default()
            ),
        }

        Ok(results)
    }

    fn embedding_text(&self, query: &Query, history: &[Turn]) -> String {
        if self.history_turns == 0 || history.is_empty() {
            return query.text.clone();
        }

        let start = history.len().saturating_sub(self.history_turns);
        let mut parts: Vec<&str> = history[start..]
            .iter()
            .map(|turn| turn.query.text.as_str())
            .collect();
        parts.push(&query.text);
        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::types::Answer;
    use crate::store::MemoryStore;
    use crate::tests::{chunk, FixedEmbedder};

    fn retriever(store: MemoryStore) -> Retriever {
        Retriever::new(Arc::new(store), Arc::new(FixedEmbedder::new(vec![1.0, 0.0])))
    }

    #[tokio::test]
    async fn test_empty_store_is_retrieval_error() {
        let err = retriever(MemoryStore::new())
            .retrieve(&Query::new("c", "dose?"), 5)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Retrieval(_)));
    }

    #[tokio::test]
    async fn test_k_zero_is_empty() {
        // Even an empty store is not consulted
        let results = retriever(MemoryStore::new())
            .retrieve(&Query::new("c", "dose?"), 0)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_min_score_filters() {
        let store = MemoryStore::with_chunks(vec![
            chunk("near", "a.txt", vec![1.0, 0.1], 1),
            chunk("far", "b.txt", vec![0.0, 1.0], 1),
        ]);
        let results = retriever(store)
            .with_min_score(0.5)
            .retrieve(&Query::new("c", "dose?"), 5)
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "near");
    }

    #[test]
    fn test_embedding_text_uses_recent_history() {
        let r = retriever(MemoryStore::new()).with_history_turns(1);
        let turn = |text: &str| Turn {
            query: Query::new("c", text),
            answer: Answer {
                text: String::new(),
                citations: Vec::new(),
                conversation_id: "c".to_string(),
            },
        };
        let history = vec![turn("malaria in pregnancy"), turn("first trimester")];

        assert_eq!(
            r.embedding_text(&Query::new("c", "dose?"), &history),
            "first trimester\ndose?"
        );
        assert_eq!(
            r.clone().with_history_turns(0).embedding_text(&Query::new("c", "dose?"), &history),
            "dose?"
        );
    }
}
