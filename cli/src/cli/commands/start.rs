use std::path::PathBuf;

use chat_relay_core::config::{expand_path, load_config};
use chat_relay_core::relay::RelayServer;

pub async fn run(config_path: Option<PathBuf>, port_override: Option<u16>) -> anyhow::Result<()> {
    // Load configuration
    let mut config = load_config(config_path.as_ref().map(expand_path))?;

    // Apply port override if provided
    if let Some(port) = port_override {
        config.server.port = port;
    }

    tracing::info!("Starting chat relay...");
    tracing::info!("  Port: {}", config.server.port);
    tracing::info!("  Host: {}", config.server.host);
    tracing::info!("  Upstream: {}", config.upstream.base_url);
    tracing::info!("  Daily shared-key quota: {}", config.quota.daily_limit);

    if config.wechat.app_id.is_empty() || config.wechat.secret.is_empty() {
        tracing::warn!("APPID/SECRET not set; /jscode2session will be rejected by the identity provider");
    }

    let server = RelayServer::from_config(&config);

    tracing::info!("Relay server starting on http://{}:{}", config.server.host, config.server.port);
    tracing::info!("Press Ctrl+C to stop");

    // Run server (blocks until shutdown)
    server.run().await?;

    Ok(())
}
