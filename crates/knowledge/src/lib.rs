//! Knowledge bases of medical guidelines and grounded answering over them.
//!
//! A knowledge base lives under `.medrag/knowledge/<base>/`:
//! - `config.yaml`: embedding, chunking, retrieval and generation settings
//! - `index.sqlite`: chunks and their embeddings
//! - `sources.jsonl`: one record per ingested file
//!
//! [`ingest`] fills a base; [`open_pipeline`] wires its store, embedder and
//! answer prompt into a [`rag::RagPipeline`] whose orchestrator serves
//! conversations.

pub mod chunker;
pub mod config;
pub mod embeddings;
pub mod eval;
pub mod ingest;
pub mod parser;
pub mod rag;
pub mod sources;
pub mod store;
pub mod types;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use embeddings::{create_provider, EmbeddingConfig, EmbeddingProvider};
pub use rag::{
    Answer, AnswerComposer, AnswerFragment, Citation, ConversationId, Query, RagPipeline,
    Retriever, SessionOrchestrator, Turn, TurnPhase, TurnStream,
};
pub use store::{DocumentStore, MemoryStore, SqliteStore};
pub use types::{
    BaseStats, DocumentChunk, IngestOptions, IngestStats, KnowledgeBaseConfig, RetrievalResult,
    ScoredChunk, SourceRecord, TokenPricing,
};

use medrag_core::{AppError, AppResult};
use medrag_llm::LlmClient;
use sources::SourceLog;
use std::path::Path;
use std::sync::Arc;

/// Ingest files into a knowledge base, creating it if needed.
pub async fn ingest(
    workspace: &Path,
    options: IngestOptions,
    api_key: Option<&str>,
) -> AppResult<IngestStats> {
    tracing::info!("Starting ingest for base '{}'", options.base_name);

    let mut config = config::load_config(workspace, &options.base_name)?;
    let store = SqliteStore::open(&config::get_index_path(workspace, &options.base_name))?;
    let log = SourceLog::new(workspace, &options.base_name);

    if options.reset {
        tracing::info!("Resetting knowledge base '{}'", options.base_name);
        store.reset().await?;
        log.clear()?;
    }

    if let Some(embedding) = &options.embedding {
        if store.count().await? > 0 {
            config.embedding.validate_consistency(embedding).map_err(|e| {
                AppError::Config(format!(
                    "{}. Re-run with --reset to re-embed base '{}'",
                    e, options.base_name
                ))
            })?;
        }
        config.embedding = embedding.clone();
    }

    let embedder = create_provider(&config.embedding, api_key)?;
    tracing::debug!(
        "Embedding with {} ({}, {} dims)",
        embedder.provider_name(),
        embedder.model_name(),
        embedder.dimensions()
    );

    let stats = ingest::ingest_paths(&store, embedder.as_ref(), &config, &options, &log).await?;

    config::save_config(workspace, &config)?;
    Ok(stats)
}

/// Open a base's store and embedder for retrieval.
///
/// A base that was never ingested opens as an empty store, so retrieval
/// fails with a retrieval error instead of opening failing.
pub fn open_retriever(
    workspace: &Path,
    config: &KnowledgeBaseConfig,
    api_key: Option<&str>,
) -> AppResult<Retriever> {
    let store = SqliteStore::open(&config::get_index_path(workspace, &config.name))?;
    let embedder = create_provider(&config.embedding, api_key)?;

    Ok(Retriever::new(Arc::new(store), embedder)
        .with_min_score(config.min_score)
        .with_history_turns(config.history_turns as usize))
}

/// Open a base for answering with the given chat backend and model.
pub fn open_pipeline(
    workspace: &Path,
    base_name: &str,
    llm: Arc<dyn LlmClient>,
    model: &str,
    api_key: Option<&str>,
) -> AppResult<RagPipeline> {
    let config = config::load_config(workspace, base_name)?;
    let retriever = open_retriever(workspace, &config, api_key)?;
    let prompt = medrag_prompt::resolve_prompt(workspace, &config.prompt_id)?;

    tracing::debug!(
        "Opened base '{}' (top_k: {}, min_score: {:.2}, prompt: {})",
        base_name,
        config.top_k,
        config.min_score,
        prompt.id
    );

    let composer = AnswerComposer::new(llm, prompt, config.generation_options(model));

    Ok(RagPipeline {
        retriever,
        composer,
        config,
    })
}

/// Delete every chunk and source record of a base.
pub async fn clean(workspace: &Path, base_name: &str) -> AppResult<()> {
    let index_path = config::get_index_path(workspace, base_name);
    if !index_path.exists() {
        return Err(AppError::Knowledge(format!(
            "Knowledge base '{}' does not exist",
            base_name
        )));
    }

    SqliteStore::open(&index_path)?.reset().await?;
    SourceLog::new(workspace, base_name).clear()?;

    tracing::info!("Knowledge base '{}' cleaned", base_name);
    Ok(())
}

/// Counts and sizes of a base.
pub async fn stats(workspace: &Path, base_name: &str) -> AppResult<BaseStats> {
    let index_path = config::get_index_path(workspace, base_name);
    if !index_path.exists() {
        return Err(AppError::Knowledge(format!(
            "Knowledge base '{}' does not exist",
            base_name
        )));
    }

    let store = SqliteStore::open(&index_path)?;
    let chunks_count = store.count().await? as u32;
    let sources_count = store.source_count().await? as u32;
    let db_size_bytes = std::fs::metadata(&index_path).map(|m| m.len()).unwrap_or(0);
    let last_ingest_at = SourceLog::new(workspace, base_name).last_indexed_at()?;

    Ok(BaseStats {
        base_name: base_name.to_string(),
        sources_count,
        chunks_count,
        db_size_bytes,
        last_ingest_at,
    })
}
