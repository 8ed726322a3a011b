//! Standalone rendezvous relay

use clap::Parser;
use rendezvous_server::RelayConfig;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rendezvous_server=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    let config = RelayConfig::parse();
    if let Err(e) = rendezvous_server::run(config).await {
        error!("relay stopped: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
