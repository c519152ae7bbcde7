//! Console chat client
//!
//! Connects to a chat server, forwards stdin lines to it and prints what
//! the server broadcasts on stdout. Logging goes to stderr.

use std::env;
use std::io::{self, BufReader};
use std::process;

use clap::{Parser, ValueEnum};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use broadcast_chat::server::DEFAULT_PORT;
use broadcast_chat::{ChatClient, Failure, OutputMode};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Output {
    /// Rendered `[date] author > content` lines
    Text,
    /// JSON message lines
    Object,
}

impl From<Output> for OutputMode {
    fn from(output: Output) -> Self {
        match output {
            Output::Text => OutputMode::Text,
            Output::Object => OutputMode::Object,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "chat_client", about = "Console client for the chat server")]
struct Args {
    /// Server host
    #[arg(short = 'H', long, default_value = "localhost")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Display name (defaults to $LOGNAME, then $USERNAME)
    #[arg(short, long)]
    name: Option<String>,

    /// How received messages are printed
    #[arg(short, long, value_enum, default_value_t = Output::Text)]
    output: Output,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn user_name(explicit: Option<String>) -> Option<String> {
    explicit
        .or_else(|| env::var("LOGNAME").ok())
        .or_else(|| env::var("USERNAME").ok())
        .filter(|name| !name.trim().is_empty())
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose {
        "broadcast_chat=debug,chat_client=debug"
    } else {
        "broadcast_chat=warn,chat_client=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    let Some(name) = user_name(args.name) else {
        error!("{}, abort", Failure::NoUserName);
        process::exit(Failure::NoUserName.code());
    };

    let client = match ChatClient::connect((args.host.as_str(), args.port), &name) {
        Ok(client) => client,
        Err(e) => {
            let failure = e.failure();
            error!("{}: {}", failure, e);
            process::exit(failure.code());
        }
    };

    let mode = OutputMode::from(args.output);
    info!("Client {} started ({})", name, mode);
    let mut sink = mode.sink(io::stdout());

    match client.run(BufReader::new(io::stdin()), &mut sink) {
        Ok(outcome) => info!("Client ended: {:?}", outcome),
        Err(e) => {
            let failure = e.failure();
            error!("{}: {}", failure, e);
            process::exit(failure.code());
        }
    }
}
