use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;

/// OpenAI-compatible access gateway for Amazon Bedrock.
#[derive(Debug, Parser)]
#[command(name = "gateway", version)]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEWAY_CONFIG", default_value = "./gateway.toml")]
    pub config: PathBuf,

    /// Listen address override.
    #[arg(short, long, env = "GATEWAY_LISTEN_ADDRESS")]
    pub listen_address: Option<SocketAddr>,

    /// Log filter, e.g. "info" or "llm=debug".
    #[arg(long, env = "GATEWAY_LOG")]
    pub log_filter: Option<String>,
}

impl Args {
    /// Effective log filter. An explicit filter wins; otherwise the `DEBUG`
    /// environment flag selects verbose logging.
    pub fn log_filter(&self) -> String {
        if let Some(filter) = &self.log_filter {
            return filter.clone();
        }

        if debug_enabled() { "debug".to_string() } else { "info".to_string() }
    }
}

fn debug_enabled() -> bool {
    std::env::var("DEBUG")
        .map(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
