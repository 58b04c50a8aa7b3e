//! Stats command handler.

use super::print_json;
use clap::Args;
use medrag_core::{config::AppConfig, AppResult};

/// Show knowledge base statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command for base '{}'", config.knowledge_base);

        let stats = medrag_knowledge::stats(&config.workspace, &config.knowledge_base).await?;

        if self.json {
            print_json(&serde_json::json!({
                "base": stats.base_name,
                "sourcesCount": stats.sources_count,
                "chunksCount": stats.chunks_count,
                "dbSizeBytes": stats.db_size_bytes,
                "lastIngestAt": stats.last_ingest_at,
            }))?;
        } else {
            println!("Knowledge base: {}", stats.base_name);
            println!("  Sources: {}", stats.sources_count);
            println!("  Chunks: {}", stats.chunks_count);
            println!("  DB size: {} bytes", stats.db_size_bytes);
            if let Some(last_ingest) = stats.last_ingest_at {
                println!("  Last ingest: {}", last_ingest);
            }
        }

        Ok(())
    }
}
