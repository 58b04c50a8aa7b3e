//! Ask command handler.
//!
//! Answers one question from the knowledge base, streaming the answer.

use super::{open_pipeline, print_citations, print_json, run_turn, TurnOutcome};
use clap::Args;
use medrag_core::{config::AppConfig, AppError, AppResult};
use std::path::PathBuf;

/// Ask a single question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Number of passages to retrieve (overrides the base's top_k)
    #[arg(short = 'k', long)]
    pub top_k: Option<u32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let question = self.get_question()?;
        let mut pipeline = open_pipeline(config)?;
        if let Some(top_k) = self.top_k {
            pipeline.config.top_k = top_k;
        }

        let orchestrator = pipeline.orchestrator();
        let conversation_id = orchestrator.create_conversation();
        let stream = orchestrator.submit_turn(&conversation_id, question.as_str());

        match run_turn(stream, self.json).await? {
            TurnOutcome::Answered { text, citations } => {
                if self.json {
                    print_json(&serde_json::json!({
                        "question": question,
                        "answer": text,
                        "citations": citations,
                        "promptId": pipeline.composer.prompt_id(),
                        "model": config.model,
                        "provider": config.provider,
                    }))?;
                } else {
                    print_citations(&citations);
                }
                Ok(())
            }
            TurnOutcome::Cancelled => Err(AppError::Cancelled),
        }
    }

    fn get_question(&self) -> AppResult<String> {
        let question = match (&self.question, &self.file) {
            (Some(question), _) => question.clone(),
            (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
                AppError::Config(format!("Failed to read question file {:?}: {}", path, e))
            })?,
            (None, None) => String::new(),
        };

        let question = question.trim().to_string();
        if question.is_empty() {
            return Err(AppError::Config("No question provided".to_string()));
        }
        Ok(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(question: Option<&str>, file: Option<PathBuf>) -> AskCommand {
        AskCommand {
            question: question.map(String::from),
            file,
            top_k: None,
            json: false,
        }
    }

    #[test]
    fn test_question_from_argument() {
        let cmd = command(Some("  Malaria dose?  "), None);
        assert_eq!(cmd.get_question().unwrap(), "Malaria dose?");
    }

    #[test]
    fn test_missing_question_is_config_error() {
        assert!(matches!(
            command(None, None).get_question(),
            Err(AppError::Config(_))
        ));
        assert!(command(Some("   "), None).get_question().is_err());
    }
}
