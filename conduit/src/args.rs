use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Conduit LLM relay
#[derive(Debug, Parser)]
#[command(name = "conduit", about = "Streaming relay for OpenAI, Anthropic and Gemini chat APIs")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "conduit.toml", env = "CONDUIT_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "CONDUIT_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log filter directive, used when `RUST_LOG` is unset
    #[arg(long, default_value = "info")]
    pub log: String,
}
