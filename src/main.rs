use anyhow::Result;
use mcp_control_server::{
    builtin::{SystemProvider, SYSTEM_CATEGORY},
    registry::provider_factory,
    McpServer, ServerSettings, ToolRegistry,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = ServerSettings::from_env()?;

    let default_filter = if settings.enable_debug_log {
        "mcp_control_server=debug,tower_http=debug"
    } else {
        "mcp_control_server=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let registry = ToolRegistry::initialize([(
        SYSTEM_CATEGORY,
        provider_factory(|| Ok(SystemProvider::new())),
    )])?;

    let server = McpServer::new(registry, settings.clone());
    if settings.auto_start {
        server.start().await?;
    } else {
        info!(port = settings.port, "Auto start disabled; MCP control server idle");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    server.stop().await;
    Ok(())
}
