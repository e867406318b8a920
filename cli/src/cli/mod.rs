pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(author, version, about = "WebSocket relay for streaming chat completions")]
pub struct Cli {
    /// Path to config file (checked in order: local config.toml, ~/.config/chat-relay/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the relay server
    Start {
        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show configuration and whether a relay is running
    Status,
}
