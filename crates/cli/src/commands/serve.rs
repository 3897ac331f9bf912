//! `powergate serve` — Start the HTTP gateway server.

use powergate_gateway::GatewayState;
use powergate_ledger::SqliteStore;
use powergate_proxy::{MeteredProxy, UpstreamClient};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub async fn run(
    config_path: Option<PathBuf>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let store = Arc::new(SqliteStore::new(&config.database.path).await?);
    let upstream = UpstreamClient::new(Duration::from_secs(config.upstream.request_timeout_secs))?
        .with_fallback_key(config.upstream.api_key.clone());
    let proxy = MeteredProxy::new(store.clone(), store.clone(), upstream);

    let state = Arc::new(GatewayState {
        proxy,
        ledger: store.clone(),
        models: store,
    });

    println!("⚡ Powergate Gateway");
    println!(
        "   Listening: {}:{}",
        config.gateway.host, config.gateway.port
    );
    println!("   Database:  {}", config.database.path);

    powergate_gateway::serve(state, &config.gateway.host, config.gateway.port).await?;

    Ok(())
}
