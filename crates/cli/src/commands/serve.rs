//! Serve command handler.

use crate::server;
use clap::Args;
use medrag_core::{config::AppConfig, AppResult};
use std::net::SocketAddr;
use std::sync::Arc;

/// Serve conversations over HTTP
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8000", env = "MEDRAG_ADDR")]
    pub addr: SocketAddr,
}

impl ServeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing serve command for base '{}'", config.knowledge_base);

        let pipeline = super::open_pipeline(config)?;
        let orchestrator = Arc::new(pipeline.orchestrator());

        server::serve(self.addr, orchestrator).await
    }
}
