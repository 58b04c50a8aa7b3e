//! Interactive multi-turn chat.

use super::{open_pipeline, print_citations, run_turn, TurnOutcome};
use clap::Args;
use medrag_core::{config::AppConfig, AppError, AppResult};
use medrag_knowledge::SessionOrchestrator;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Chat with the knowledge base (Ctrl-C cancels the running answer)
#[derive(Args, Debug)]
pub struct ChatCommand {
    /// Hide the source list after each answer
    #[arg(long)]
    pub no_sources: bool,
}

/// A line typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
enum Input<'a> {
    Question(&'a str),
    History,
    Exit,
    Empty,
}

fn parse_input(line: &str) -> Input<'_> {
    match line.trim() {
        "" => Input::Empty,
        "/exit" | "/quit" => Input::Exit,
        "/history" => Input::History,
        question => Input::Question(question),
    }
}

impl ChatCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing chat command");

        let orchestrator = open_pipeline(config)?.orchestrator();
        let conversation_id = orchestrator.create_conversation();
        tracing::debug!("Chat conversation {}", conversation_id);

        println!(
            "Ask about the '{}' guidelines. /history shows the conversation, /exit quits.",
            config.knowledge_base
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush().ok();

            let line = tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };

            match parse_input(&line) {
                Input::Empty => continue,
                Input::Exit => break,
                Input::History => print_history(&orchestrator, &conversation_id),
                Input::Question(question) => {
                    let stream = orchestrator.submit_turn(&conversation_id, question);
                    match run_turn(stream, false).await {
                        Ok(TurnOutcome::Answered { citations, .. }) => {
                            if !self.no_sources {
                                print_citations(&citations);
                            }
                        }
                        Ok(TurnOutcome::Cancelled) => println!("[cancelled]"),
                        Err(e) => print_turn_error(&e),
                    }
                    println!();
                }
            }
        }

        println!();
        Ok(())
    }
}

fn print_history(orchestrator: &SessionOrchestrator, conversation_id: &str) {
    let turns = orchestrator.history(conversation_id).unwrap_or_default();
    if turns.is_empty() {
        println!("(no turns yet)");
        return;
    }
    for (i, turn) in turns.iter().enumerate() {
        println!("{}. Q: {}", i + 1, turn.query.text);
        println!("   A: {}", turn.answer.text);
    }
}

// Turn errors end the turn, not the chat.
fn print_turn_error(error: &AppError) {
    tracing::warn!("Turn failed: {}", error);
    match error {
        AppError::Grounding(_) => {
            println!("The guidelines in this knowledge base do not cover that question.")
        }
        AppError::Retrieval(msg) => println!("Cannot search the guidelines: {}", msg),
        AppError::Generation(msg) => println!("The language model failed: {}", msg),
        other => println!("Error: {}", other),
    }
}
