//! Ingest command handler.

use super::print_json;
use clap::Args;
use medrag_core::{config::AppConfig, AppResult};
use medrag_knowledge::{EmbeddingConfig, IngestOptions};
use std::path::PathBuf;

/// Ingest guideline documents into the knowledge base
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// Files or directories to ingest
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Only ingest paths containing one of these substrings
    #[arg(long)]
    pub include: Vec<String>,

    /// Skip paths containing one of these substrings
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Delete the base's chunks before ingesting
    #[arg(long)]
    pub reset: bool,

    /// Embedding provider (trigram, ollama, openai)
    #[arg(long)]
    pub embedding_provider: Option<String>,

    /// Embedding model
    #[arg(long)]
    pub embedding_model: Option<String>,

    /// Embedding dimensions
    #[arg(long)]
    pub dimensions: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command for base '{}'", config.knowledge_base);

        let current =
            medrag_knowledge::config::load_config(&config.workspace, &config.knowledge_base)?;
        let embedding = self.embedding_override(&current.embedding);
        let embedding_provider = embedding
            .as_ref()
            .map(|e| e.provider.clone())
            .unwrap_or(current.embedding.provider);
        let api_key = config.resolve_api_key(&embedding_provider);

        let options = IngestOptions {
            base_name: config.knowledge_base.clone(),
            paths: self.paths.clone(),
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            reset: self.reset,
            embedding,
        };

        let stats =
            medrag_knowledge::ingest(&config.workspace, options, api_key.as_deref()).await?;

        if self.json {
            print_json(&serde_json::json!({
                "base": config.knowledge_base,
                "sourcesCount": stats.sources_count,
                "skippedCount": stats.skipped_count,
                "chunksCount": stats.chunks_count,
                "bytesProcessed": stats.bytes_processed,
                "durationSecs": stats.duration_secs,
            }))?;
        } else {
            println!(
                "Ingested {} sources ({} chunks, {} bytes) in {:.2}s",
                stats.sources_count, stats.chunks_count, stats.bytes_processed, stats.duration_secs
            );
            if stats.skipped_count > 0 {
                println!("Skipped {} unsupported or unreadable files", stats.skipped_count);
            }
        }

        Ok(())
    }

    /// The embedding settings requested on the command line, if any differ from `current`.
    fn embedding_override(&self, current: &EmbeddingConfig) -> Option<EmbeddingConfig> {
        if self.embedding_provider.is_none()
            && self.embedding_model.is_none()
            && self.dimensions.is_none()
        {
            return None;
        }

        let mut embedding = current.clone();
        if let Some(provider) = &self.embedding_provider {
            embedding.provider = provider.clone();
        }
        if let Some(model) = &self.embedding_model {
            embedding.model = model.clone();
        }
        if let Some(dimensions) = self.dimensions {
            embedding.dimensions = dimensions;
        }
        Some(embedding)
    }
}
