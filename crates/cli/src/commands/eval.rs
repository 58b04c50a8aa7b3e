//! Eval command handler.

use super::print_json;
use clap::Args;
use medrag_core::{config::AppConfig, AppResult};
use medrag_knowledge::eval;
use std::path::PathBuf;

/// Measure retrieval hit rate at k over a labelled dataset
#[derive(Args, Debug)]
pub struct EvalCommand {
    /// JSON array of {"question", "expected_doc_filename"} cases
    pub dataset: PathBuf,

    /// Passages retrieved per question
    #[arg(short = 'k', long, default_value = "5")]
    pub k: usize,

    /// Output the full report as JSON
    #[arg(long)]
    pub json: bool,
}

impl EvalCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing eval command on {:?}", self.dataset);

        let cases = eval::load_dataset(&self.dataset)?;
        let base = medrag_knowledge::config::load_config(&config.workspace, &config.knowledge_base)?;
        let api_key = config.resolve_api_key(&base.embedding.provider);
        let retriever = medrag_knowledge::open_retriever(&config.workspace, &base, api_key.as_deref())?;

        let report = eval::evaluate(&retriever, &cases, self.k).await?;

        if self.json {
            print_json(&report)?;
        } else {
            for case in report.cases.iter().filter(|c| !c.hit) {
                println!(
                    "MISS {} (expected {}, got {})",
                    case.question,
                    case.expected_doc_filename,
                    case.retrieved_documents.join(", ")
                );
            }
            println!(
                "Evaluation complete. hit_rate@{}: {:.3} ({}/{})",
                report.k, report.hit_rate, report.hits, report.total
            );
        }

        Ok(())
    }
}
