//! Embedding providers for knowledge bases.
//!
//! Documents and queries of one base must be embedded by the same provider;
//! [`EmbeddingConfig::validate_consistency`] guards re-ingestion.

pub mod config;
pub mod provider;
pub mod providers;

pub use config::EmbeddingConfig;
pub use provider::{create_provider, EmbeddingProvider};
