//! portfwd - TCP Port Forwarder
//!
//! Listens on a local port and relays every inbound connection to a fixed
//! remote host:port.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use portfwd::{Config, Destination, Forwarder};

/// CLI arguments: `portfwd <localPort> <remoteHost> <remotePort> [verbose]`
#[derive(Parser, Debug)]
#[command(name = "portfwd")]
#[command(about = "TCP port forwarder: relays every inbound connection to a fixed remote host:port")]
#[command(version)]
struct CliArgs {
    /// Local TCP port to listen on
    #[arg(value_name = "localPort")]
    local_port: u16,

    /// Remote host to forward to (IPv4 literal, IPv6 literal, or hostname)
    #[arg(value_name = "remoteHost")]
    remote_host: String,

    /// Remote TCP port
    #[arg(value_name = "remotePort")]
    remote_port: u16,

    /// Pass "verbose" to log every relayed payload chunk
    #[arg(value_name = "verbose")]
    verbose: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // The contract for bad or missing arguments is a usage message and exit
    // code 1, so bypass clap's default exit code.
    let args = match CliArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            use clap::error::ErrorKind;
            if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                print!("{e}");
                std::process::exit(0);
            }
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    let verbose = args.verbose.is_some();

    init_tracing(verbose);

    info!("Starting portfwd v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::new(args.local_port, args.remote_host, args.remote_port, verbose);
    config.apply_env().context("invalid environment override")?;
    config.validate().context("invalid configuration")?;

    // Resolved once; every session forwards to the same address.
    let destination = Destination::resolve(&config.remote_host, config.remote_port)
        .await
        .context("failed to resolve destination")?;

    info!(
        "Forwarding port {} -> {} (buffer: {} bytes)",
        config.local_port, destination, config.buffer_size
    );

    let mut forwarder = Forwarder::bind(Arc::new(config), destination).await?;

    // Runs until terminated externally or the listener fails.
    forwarder.run().await
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_ansi(true),
        )
        .with(env_filter)
        .init();
}
