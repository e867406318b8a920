use std::path::PathBuf;

use chat_relay_core::config::{default_config_path, expand_path, load_config};

pub async fn run(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path.as_ref().map(expand_path))?;

    println!("Chat Relay Status");
    println!("=================");
    println!();
    println!("Configuration:");
    println!("  Config file: {:?}", config_path.unwrap_or_else(default_config_path));
    println!();
    println!("Server settings:");
    println!("  Host: {}", config.server.host);
    println!("  Port: {}", config.server.port);
    println!();
    println!("Relay:");
    println!("  Upstream: {}", config.upstream.base_url);
    println!("  Shared key: {}", if config.upstream.api_key.is_some() { "configured" } else { "not set" });
    println!("  Daily quota: {}", config.quota.daily_limit);
    println!("  Moderation: {}", if config.moderation.credentials().is_some() { "enabled" } else { "disabled" });

    // Check if server is reachable
    println!();
    let host = if config.server.host == "0.0.0.0" { "127.0.0.1" } else { config.server.host.as_str() };
    let url = format!("http://{}:{}/healthz", host, config.server.port);
    match reqwest::get(&url).await {
        Ok(resp) if resp.status().is_success() => {
            println!("Server: RUNNING ✓");
        }
        _ => {
            println!("Server: NOT RUNNING");
        }
    }

    Ok(())
}
