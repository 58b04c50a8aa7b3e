//! LLM integration crate for medrag.
//!
//! Provider-agnostic access to text-generation backends through the
//! [`LlmClient`] trait. Both blocking completions and token streaming are
//! supported.
//!
//! # Providers
//! - **Ollama**: local runtime (default)
//! - **OpenAI**: chat completions API
//!
//! # Example
//! ```no_run
//! use medrag_llm::{LlmClient, LlmRequest, providers::OllamaClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = OllamaClient::new();
//! let request = LlmRequest::new("What is the first-line treatment for malaria?", "llama3.2");
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod lines;
pub mod providers;
pub mod types;

// Re-export main types
pub use client::{LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk, LlmUsage};
pub use factory::create_client;
pub use providers::{OllamaClient, OpenAiClient};
pub use types::{GenerationOptions, ProviderType};
