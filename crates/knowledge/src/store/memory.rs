//! In-process document store for tests and ephemeral bases.

use super::{rank, DocumentStore};
use crate::types::{DocumentChunk, ScoredChunk};
use medrag_core::AppResult;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Chunks held in memory, keyed by id.
#[derive(Debug, Default)]
pub struct MemoryStore {
    chunks: RwLock<BTreeMap<String, Arc<DocumentChunk>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-filled with chunks.
    pub fn with_chunks(chunks: impl IntoIterator<Item = DocumentChunk>) -> Self {
        let map = chunks
            .into_iter()
            .map(|c| (c.id.clone(), Arc::new(c)))
            .collect();
        Self {
            chunks: RwLock::new(map),
        }
    }

    // No code panics while holding the lock, so a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<DocumentChunk>>> {
        self.chunks.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<DocumentChunk>>> {
        self.chunks.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn count(&self) -> AppResult<usize> {
        Ok(self.read().len())
    }

    async fn search(&self, embedding: &[f32], limit: usize) -> AppResult<Vec<ScoredChunk>> {
        Ok(rank(self.read().values(), embedding, limit))
    }

    async fn upsert(&self, chunks: Vec<DocumentChunk>) -> AppResult<usize> {
        let written = chunks.len();
        let mut map = self.write();
        for chunk in chunks {
            map.insert(chunk.id.clone(), Arc::new(chunk));
        }
        Ok(written)
    }

    async fn replace_source(
        &self,
        source_document: &str,
        chunks: Vec<DocumentChunk>,
    ) -> AppResult<(usize, usize)> {
        let written = chunks.len();
        let mut map = self.write();
        let before = map.len();
        map.retain(|_, chunk| chunk.source_document != source_document);
        let removed = before - map.len();
        for chunk in chunks {
            map.insert(chunk.id.clone(), Arc::new(chunk));
        }
        Ok((removed, written))
    }

    async fn reset(&self) -> AppResult<()> {
        self.write().clear();
        Ok(())
    }
}
