use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::core::AppConfig;

pub mod chat;
pub mod history;
pub mod init;
pub mod serve;

#[derive(Subcommand)]
enum Command {
    /// Create the storage directory and the chat history database
    Init {},
    /// Start an interactive chat session
    Chat {},
    /// List saved conversations
    History {},
    /// Run the API server
    Serve {
        /// Set the server host address
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Set the server port
        #[arg(long, default_value = "2222")]
        port: String,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

/// Log to stderr filtered by `RUST_LOG`, falling back to
/// `default_filter`.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();

    // The server is the only place where request level logs are
    // wanted by default, everything else stays quiet
    match &args.command {
        Some(Command::Serve { .. }) => init_tracing(&format!(
            "{}=debug,tower_http=debug",
            env!("CARGO_CRATE_NAME")
        )),
        _ => init_tracing("warn"),
    }

    let config = AppConfig::default();

    // Handle each sub command
    match args.command {
        Some(Command::Init {}) => {
            init::run(&config)?;
        }
        Some(Command::Chat {}) => {
            chat::run(config).await?;
        }
        Some(Command::History {}) => {
            history::run(&config)?;
        }
        Some(Command::Serve { host, port }) => {
            serve::run(host, port, config).await?;
        }
        None => {}
    }

    Ok(())
}
