use anyhow::Result;
use telecare_relay::{RelayConfig, RelayState, SignalingService, router};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = RelayConfig::from_env();
    info!(addr = %config.listen_addr, "starting consultation signaling relay");

    let service = SignalingService::new(config.ice_servers.clone());
    let state = RelayState::new(service);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}
