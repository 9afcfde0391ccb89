//! ConsentLex CLI
//!
//! Review informed-consent documents with an AI assistant from the terminal.

use anyhow::Result;
use clap::Parser;
use consentlex_core::error::exit_codes;
use consentlex_core::ConsentLexError;

mod app;
mod commands;
mod logging;
mod output;
mod progress;
mod settings;

use app::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            match err.downcast_ref::<ConsentLexError>() {
                Some(e) => {
                    eprintln!("Hint: {}", e.remediation());
                    e.exit_code()
                }
                None => exit_codes::GENERAL_ERROR,
            }
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    let config = settings::load(&cli)?;
    // Dropped at the end of this function so buffered log lines are flushed.
    let _log_guard = logging::init(&config.logging, cli.verbose);
    tracing::info!(version = consentlex_core::VERSION, "consentlex starting");

    let result = match &cli.command {
        Commands::Chat(args) => commands::chat::run(args, config, &cli).await,
        Commands::Ask(args) => commands::ask::run(args, config, &cli).await,
        Commands::Extract(args) => commands::extract::run(args, config, &cli).await,
        Commands::Export(args) => commands::export::run(args, config, &cli).await,
        Commands::Doctor(args) => commands::doctor::run(args, config, &cli).await,
        Commands::Config(args) => commands::config::run(args, config, &cli).await,
    };

    if let Err(ref e) = result {
        tracing::error!(error = %format!("{e:#}"), "command failed");
    }
    result
}
