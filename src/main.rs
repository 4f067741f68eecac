//! Multi-room TCP Chat Server - Entry Point
//!
//! Parses configuration, then runs the listener until Ctrl-C or SIGTERM.

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use multiroom_chat::{listener, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=multiroom_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("multiroom_chat=info")),
        )
        .init();

    let config = ServerConfig::parse();

    if let Err(e) = listener::run(config).await {
        error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
