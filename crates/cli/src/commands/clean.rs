//! Clean command handler.

use clap::Args;
use medrag_core::{config::AppConfig, AppResult};

/// Delete every chunk and source record of the knowledge base
#[derive(Args, Debug)]
pub struct CleanCommand {}

impl CleanCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing clean command for base '{}'", config.knowledge_base);

        medrag_knowledge::clean(&config.workspace, &config.knowledge_base).await?;
        println!("Knowledge base '{}' cleaned", config.knowledge_base);

        Ok(())
    }
}
