//! pagecurl CLI - Command-line interface
//!
//! Drives the pagecurl library against a simulated renderer and inspects
//! pager configuration files.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pagecurl::logging::{init_logging, LoggingConfig};

use commands::config::ConfigCommands;
use commands::simulate::SimulateArgs;
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "pagecurl")]
#[command(version, about = "Speculative page snapshots for page-curl readers")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run a scripted flip session against a simulated document
    Simulate(SimulateArgs),

    /// Inspect pager configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn log_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "pagecurl=warn",
        1 => "pagecurl=debug",
        _ => "pagecurl=trace",
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut logging = LoggingConfig::default().with_directive(log_directive(cli.verbose));
    if let Some(path) = cli.log_file {
        logging = logging.with_log_file(path);
    }
    let _guard = init_logging(logging)?;

    match cli.command {
        Commands::Simulate(args) => commands::simulate::run(args),
        Commands::Config { command } => commands::config::run(command),
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
