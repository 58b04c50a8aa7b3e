//! Error types for medrag.
//!
//! A single error enum covers configuration, I/O, provider, prompt and
//! storage failures, plus the four terminal outcomes of a conversation turn:
//! retrieval, grounding, generation and cancellation.

use thiserror::Error;

/// Unified error type for medrag.
///
/// All fallible functions return `Result<T, AppError>`.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level LLM or embedding provider errors
    #[error("LLM error: {0}")]
    Llm(String),

    /// Knowledge base bookkeeping errors (store files, ingestion)
    #[error("Knowledge error: {0}")]
    Knowledge(String),

    /// Prompt system errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The document store is unreachable or holds no chunks
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// No relevant context was found, so the answer is refused
    #[error("Grounding error: {0}")]
    Grounding(String),

    /// The language-model backend failed before or during generation
    #[error("Generation error: {0}")]
    Generation(String),

    /// The caller abandoned the turn
    #[error("Turn cancelled")]
    Cancelled,

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Short machine-readable name of the error kind.
    ///
    /// Used as the `kind` field of streamed error events.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Llm(_) => "llm",
            AppError::Knowledge(_) => "knowledge",
            AppError::Prompt(_) => "prompt",
            AppError::Serialization(_) => "serialization",
            AppError::Retrieval(_) => "retrieval",
            AppError::Grounding(_) => "grounding",
            AppError::Generation(_) => "generation",
            AppError::Cancelled => "cancelled",
            AppError::Other(_) => "other",
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
