use std::sync::Arc;

use tracing::info;
use travel_planner_mcp::{
    config::Config,
    domain::places::SamplePlaceProvider,
    generation::client::OllamaClient,
    logging, AppState, McpServer,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let generator = Arc::new(OllamaClient::new(config.ollama_settings())?);

    info!(
        base_url = %config.ollama_base_url,
        model = %generator.model(),
        stream_timeout_ms = config.ollama_stream_timeout.as_millis() as u64,
        "generation backend configured"
    );

    let state = AppState::new(
        generator,
        Arc::new(SamplePlaceProvider),
        config.ollama_stream_timeout,
    );
    let server = McpServer::new(state, config.server_settings()?).start().await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = server.local_addr().port(),
        "server starting"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    server.stop().await;
    Ok(())
}
