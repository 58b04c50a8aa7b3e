//! Knowledge system type definitions.

use crate::embeddings::EmbeddingConfig;
use chrono::{DateTime, Utc};
use medrag_llm::{GenerationOptions, LlmUsage};
use medrag_prompt::ANSWER_PROMPT_ID;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a knowledge base.
///
/// Stored at `.medrag/knowledge/<base>/config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBaseConfig {
    /// Name of the knowledge base
    pub name: String,

    /// Embedding backend settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Chunk size in words
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,

    /// Overlap between consecutive chunks, in words
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: u32,

    /// Number of chunks retrieved per turn
    #[serde(default = "default_top_k")]
    pub top_k: u32,

    /// Minimum cosine similarity for a chunk to count as relevant.
    /// Range: -1.0 to 1.0. 0.20 suits the trigram embedder; neural
    /// embedders usually want 0.3-0.5.
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    /// Prior user queries of the conversation folded into the retrieval query
    #[serde(default)]
    pub history_turns: u32,

    /// Sampling temperature for answers
    #[serde(default)]
    pub temperature: f32,

    /// Maximum tokens generated per answer
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Versioned answer prompt identifier
    #[serde(default = "default_prompt_id")]
    pub prompt_id: String,

    /// Token rates for the cost estimate logged with each turn
    #[serde(default)]
    pub pricing: TokenPricing,
}

fn default_chunk_size() -> u32 {
    500
}

fn default_chunk_overlap() -> u32 {
    50
}

fn default_top_k() -> u32 {
    10
}

fn default_min_score() -> f32 {
    0.20
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_prompt_id() -> String {
    ANSWER_PROMPT_ID.to_string()
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            embedding: EmbeddingConfig::default(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            top_k: default_top_k(),
            min_score: default_min_score(),
            history_turns: 0,
            temperature: 0.0,
            max_tokens: default_max_tokens(),
            prompt_id: default_prompt_id(),
            pricing: TokenPricing::default(),
        }
    }
}

/// USD per 1000 tokens, defaulting to gpt-4o-mini list prices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TokenPricing {
    #[serde(default = "default_input_per_1k")]
    pub input_per_1k: f64,

    #[serde(default = "default_output_per_1k")]
    pub output_per_1k: f64,
}

fn default_input_per_1k() -> f64 {
    0.00015
}

fn default_output_per_1k() -> f64 {
    0.00060
}

impl Default for TokenPricing {
    fn default() -> Self {
        Self {
            input_per_1k: default_input_per_1k(),
            output_per_1k: default_output_per_1k(),
        }
    }
}

impl TokenPricing {
    /// Estimated cost of one generation in USD.
    pub fn estimate(&self, usage: &LlmUsage) -> f64 {
        (usage.prompt_tokens as f64 / 1000.0) * self.input_per_1k
            + (usage.completion_tokens as f64 / 1000.0) * self.output_per_1k
    }
}

impl KnowledgeBaseConfig {
    /// Generation options for the given chat model.
    pub fn generation_options(&self, model: &str) -> GenerationOptions {
        GenerationOptions {
            model: model.to_string(),
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
        }
    }
}

/// An indexed span of guideline text. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Deterministic chunk identifier (SHA-256 of source, position and text)
    pub id: String,

    /// File name of the source document
    pub source_document: String,

    /// Page or section label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,

    /// Position within the source document
    pub position: u32,

    pub text: String,

    #[serde(skip_serializing)]
    pub embedding: Vec<f32>,

    /// When the chunk was indexed; newer chunks win score ties
    pub indexed_at: DateTime<Utc>,
}

/// A chunk reference paired with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<DocumentChunk>,
    pub score: f32,
}

/// Ranked retrieval output, highest score first.
pub type RetrievalResult = Vec<ScoredChunk>;

/// Represents a source document in the knowledge base (sources.jsonl tracking).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Unique source identifier
    pub source_id: String,

    /// Source file path
    pub path: String,

    /// When this source was indexed
    pub indexed_at: DateTime<Utc>,

    /// Number of chunks created from this source
    pub chunk_count: u32,

    /// Source size in bytes
    pub byte_count: u64,
}

/// Options for the ingest operation.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Knowledge base name
    pub base_name: String,

    /// Files or directories to ingest
    pub paths: Vec<PathBuf>,

    /// Substring patterns a path must contain (any)
    pub include: Vec<String>,

    /// Substring patterns that exclude a path
    pub exclude: Vec<String>,

    /// Reset the base before ingesting
    pub reset: bool,

    /// Embedding backend to switch to; must match an existing index unless resetting
    pub embedding: Option<EmbeddingConfig>,
}

/// Statistics from an ingest operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestStats {
    /// Number of sources processed
    pub sources_count: u32,

    /// Number of sources skipped (unreadable or binary)
    pub skipped_count: u32,

    /// Number of chunks created
    pub chunks_count: u32,

    /// Total bytes processed
    pub bytes_processed: u64,

    /// Duration in seconds
    pub duration_secs: f64,
}

/// Statistics for a knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseStats {
    /// Base name
    pub base_name: String,

    /// Number of distinct source documents
    pub sources_count: u32,

    /// Number of chunks
    pub chunks_count: u32,

    /// Database size in bytes
    pub db_size_bytes: u64,

    /// Most recent ingestion, from sources.jsonl
    pub last_ingest_at: Option<DateTime<Utc>>,
}

/// Chunk text before embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkCandidate {
    pub position: u32,
    pub section: Option<String>,
    pub text: String,
}
