//! Multi-client TCP Chat Server - Entry Point
//!
//! Parses the command line, binds the listening socket and runs the
//! accept loop until the server is told to stop.

use std::process;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use broadcast_chat::server::{DEFAULT_PORT, DEFAULT_NAME_TIMEOUT};
use broadcast_chat::{ChatServer, Failure, ServerConfig};

/// Lowest port a user may ask for
const MIN_PORT: u16 = 1024;

/// Default accept timeout in milliseconds
const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Parser)]
#[command(name = "broadcast_chat", about = "Multi-client TCP chat server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Interface to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Accept timeout in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout: u64,

    /// Stop the server when the last client leaves (default)
    #[arg(short, long, conflicts_with = "noquit")]
    quit: bool,

    /// Keep the server running when the last client leaves
    #[arg(short, long)]
    noquit: bool,

    /// Seconds a new client has to send its name
    #[arg(long, default_value_t = DEFAULT_NAME_TIMEOUT.as_secs())]
    name_timeout: u64,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    // Use RUST_LOG env var to override, e.g. RUST_LOG=broadcast_chat=trace
    let default_filter = if args.verbose {
        "broadcast_chat=debug"
    } else {
        "broadcast_chat=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.port < MIN_PORT {
        error!("{}: {}", Failure::InvalidPort, args.port);
        process::exit(Failure::InvalidPort.code());
    }

    let config = ServerConfig {
        host: args.host,
        port: args.port,
        accept_timeout: Duration::from_millis(args.timeout),
        quit_on_empty: args.quit || !args.noquit,
        name_timeout: Duration::from_secs(args.name_timeout),
    };
    info!(
        "Creating server on port {} with timeout {} ms",
        config.port, args.timeout
    );

    let server = match ChatServer::bind(config) {
        Ok(server) => server,
        Err(e) => {
            let failure = e.failure();
            error!("{}: {}, abort ...", failure, e);
            process::exit(failure.code());
        }
    };

    if let Err(e) = server.run() {
        let failure = e.failure();
        error!("{}: {}", failure, e);
        process::exit(failure.code());
    }

    info!("Server terminated, program end");
}
