#![allow(clippy::must_use_candidate)]

mod env;
pub mod llm;
mod loader;
pub mod server;
pub mod telemetry;

use serde::Deserialize;

pub use llm::*;
pub use server::*;
pub use telemetry::TelemetryConfig;

/// Top-level conduit configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Listener, health and static file configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream providers and model routing
    #[serde(default)]
    pub llm: LlmConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
