//! Parley relay binary.
//!
//! # Usage
//!
//! ```bash
//! # Listen on the default port
//! parley-server
//!
//! # Custom address, faster liveness sweeps
//! parley-server --bind 127.0.0.1:8080 --liveness-interval-secs 10
//! ```

use std::time::Duration;

use clap::Parser;
use parley_server::{DriverConfig, Server, ServerRuntimeConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley relay server
#[derive(Parser, Debug)]
#[command(name = "parley-server")]
#[command(about = "Content-blind relay for end-to-end encrypted chat rooms")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, env = "PARLEY_BIND", default_value = "0.0.0.0:3000")]
    bind: String,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Seconds between liveness sweeps
    #[arg(long, default_value = "30")]
    liveness_interval_secs: u64,

    /// Largest accepted frame in bytes
    #[arg(long, default_value = "65536")]
    max_frame_bytes: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Parley relay starting");
    tracing::info!("Binding to {}", args.bind);

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        liveness_interval: Duration::from_secs(args.liveness_interval_secs),
        driver: DriverConfig {
            max_connections: args.max_connections,
            max_frame_bytes: args.max_frame_bytes,
        },
    };

    let server = Server::bind(config).await?;

    tracing::info!("Server listening on {}", server.local_addr()?);

    server.run().await?;

    Ok(())
}
