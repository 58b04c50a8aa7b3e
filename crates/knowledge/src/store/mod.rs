//! Document stores: where indexed chunks and their embeddings live.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::types::{DocumentChunk, ScoredChunk};
use medrag_core::AppResult;
use std::cmp::Ordering;
use std::sync::Arc;

/// Storage backend for indexed chunks.
///
/// Stores are shared between conversations and only read while serving.
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Number of stored chunks.
    async fn count(&self) -> AppResult<usize>;

    /// Return up to `limit` chunks ranked by [`rank`].
    async fn search(&self, embedding: &[f32], limit: usize) -> AppResult<Vec<ScoredChunk>>;

    /// Insert or replace chunks by id. Returns the number written.
    async fn upsert(&self, chunks: Vec<DocumentChunk>) -> AppResult<usize>;

    /// Atomically swap every chunk of one source document for `chunks`.
    ///
    /// Returns `(removed, written)`. On error the old chunks are kept.
    async fn replace_source(
        &self,
        source_document: &str,
        chunks: Vec<DocumentChunk>,
    ) -> AppResult<(usize, usize)>;

    /// Delete every chunk.
    async fn reset(&self) -> AppResult<()>;
}

/// Cosine similarity in `[-1, 1]`; 0.0 for mismatched, zero or non-finite vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (norm_a * norm_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// Total order for results: score descending, then newest `indexed_at`,
/// then chunk id ascending.
pub fn compare_ranked(a: &ScoredChunk, b: &ScoredChunk) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.chunk.indexed_at.cmp(&a.chunk.indexed_at))
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
}

/// Score every chunk against `embedding`, sort, and keep the best `limit`.
pub fn rank<'a, I>(chunks: I, embedding: &[f32], limit: usize) -> Vec<ScoredChunk>
where
    I: IntoIterator<Item = &'a Arc<DocumentChunk>>,
{
    let mut scored: Vec<ScoredChunk> = chunks
        .into_iter()
        .map(|chunk| ScoredChunk {
            score: cosine_similarity(embedding, &chunk.embedding),
            chunk: Arc::clone(chunk),
        })
        .collect();

    scored.sort_by(compare_ranked);
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn chunk(id: &str, embedding: Vec<f32>, day: u32) -> Arc<DocumentChunk> {
        Arc::new(DocumentChunk {
            id: id.to_string(),
            source_document: "who.pdf".to_string(),
            section: None,
            position: 0,
            text: id.to_string(),
            embedding,
            indexed_at: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
        })
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_rank_with_nan_scores_is_total() {
        let chunks = vec![
            chunk("corrupt", vec![f32::NAN, 0.0], 3),
            chunk("match", vec![1.0, 0.0], 1),
            chunk("orthogonal", vec![0.0, 1.0], 2),
        ];
        let ranked = rank(&chunks, &[1.0, 0.0], 10);
        assert_eq!(ranked[0].chunk.id, "match");
        assert!(ranked.iter().all(|s| s.score.is_finite()));

        let mut scored = ranked.clone();
        scored[1].score = f32::NAN;
        scored[2].score = -f32::NAN;
        scored.sort_by(compare_ranked);
        assert_eq!(scored.len(), 3);
    }

    #[test]
    fn test_rank_orders_by_score_then_recency_then_id() {
        let chunks = vec![
            chunk("old", vec![1.0, 0.0], 1),
            chunk("weak", vec![0.0, 1.0], 9),
            chunk("new-b", vec![1.0, 0.0], 5),
            chunk("new-a", vec![1.0, 0.0], 5),
        ];

        let ranked = rank(&chunks, &[1.0, 0.0], 10);
        let ids: Vec<&str> = ranked.iter().map(|s| s.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["new-a", "new-b", "old", "weak"]);
    }

    #[test]
    fn test_rank_truncates() {
        let chunks = vec![chunk("a", vec![1.0], 1), chunk("b", vec![1.0], 2)];
        assert_eq!(rank(&chunks, &[1.0], 1).len(), 1);
        assert!(rank(&chunks, &[1.0], 0).is_empty());
    }
}
