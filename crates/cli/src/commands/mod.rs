//! Command handlers for the medrag CLI.
//!
//! Each command lives in its own submodule. Answers go to stdout, logs to
//! stderr.

pub mod ask;
pub mod chat;
pub mod clean;
pub mod eval;
pub mod ingest;
pub mod serve;
pub mod stats;

pub use ask::AskCommand;
pub use chat::ChatCommand;
pub use clean::CleanCommand;
pub use eval::EvalCommand;
pub use ingest::IngestCommand;
pub use serve::ServeCommand;
pub use stats::StatsCommand;

use futures::StreamExt;
use medrag_core::{config::AppConfig, AppError, AppResult};
use medrag_knowledge::{AnswerFragment, Citation, RagPipeline, TurnStream};
use std::io::Write;

/// Open the configured knowledge base with the configured chat backend.
pub fn open_pipeline(config: &AppConfig) -> AppResult<RagPipeline> {
    config.validate()?;

    let endpoint = config.provider_endpoint();
    let api_key = config.resolve_api_key(&config.provider);
    let llm = medrag_llm::create_client(&config.provider, endpoint.as_deref(), api_key.as_deref())?;

    let base = medrag_knowledge::config::load_config(&config.workspace, &config.knowledge_base)?;
    let embedding_key = config.resolve_api_key(&base.embedding.provider);

    tracing::debug!(
        "Answering from base '{}' with {} ({})",
        config.knowledge_base,
        config.provider,
        config.model
    );

    medrag_knowledge::open_pipeline(
        &config.workspace,
        &config.knowledge_base,
        llm,
        &config.model,
        embedding_key.as_deref(),
    )
}

/// Outcome of a turn run in the terminal.
pub enum TurnOutcome {
    Answered {
        text: String,
        citations: Vec<Citation>,
    },
    Cancelled,
}

/// Drive a turn, printing fragments as they arrive unless `quiet`.
///
/// Ctrl-C cancels the turn instead of the process.
pub async fn run_turn(mut stream: TurnStream, quiet: bool) -> AppResult<TurnOutcome> {
    let cancel = stream.cancellation_token();
    let mut text = String::new();

    loop {
        let next = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                continue;
            }
            next = stream.next() => next,
        };

        match next {
            Some(Ok(AnswerFragment::Text { text: fragment })) => {
                if !quiet {
                    print!("{}", fragment);
                    std::io::stdout().flush().ok();
                }
                text.push_str(&fragment);
            }
            Some(Ok(AnswerFragment::Final { citations, usage })) => {
                if !quiet {
                    println!();
                }
                if let Some(usage) = usage {
                    tracing::debug!(
                        "Token usage - Prompt: {}, Completion: {}, Total: {}",
                        usage.prompt_tokens,
                        usage.completion_tokens,
                        usage.total_tokens
                    );
                }
                return Ok(TurnOutcome::Answered { text, citations });
            }
            Some(Err(AppError::Cancelled)) => {
                if !quiet && !text.is_empty() {
                    println!();
                }
                return Ok(TurnOutcome::Cancelled);
            }
            Some(Err(e)) => {
                if !quiet && !text.is_empty() {
                    println!();
                }
                return Err(e);
            }
            None => {
                return Err(AppError::Generation(
                    "answer stream ended without citations".to_string(),
                ))
            }
        }
    }
}

/// Print a numbered source list.
pub fn print_citations(citations: &[Citation]) {
    if citations.is_empty() {
        return;
    }

    println!();
    println!("Sources:");
    for citation in citations {
        match &citation.section {
            Some(section) => println!(
                "[{}] {} ({}), score {:.3}",
                citation.rank, citation.source_document, section, citation.score
            ),
            None => println!(
                "[{}] {}, score {:.3}",
                citation.rank, citation.source_document, citation.score
            ),
        }
    }
}

/// Print a value as pretty JSON.
pub fn print_json<T: serde::Serialize>(value: &T) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
