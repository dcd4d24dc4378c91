use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Prism chat gateway
#[derive(Debug, Parser)]
#[command(name = "prism", about = "OpenAI-compatible gateway for Gemini, Anthropic, Copilot and more")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "prism.toml", env = "PRISM_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "PRISM_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log filter used when `RUST_LOG` is unset
    #[arg(long, default_value = "info", env = "PRISM_LOG")]
    pub log: String,
}
