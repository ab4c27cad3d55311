//! Collecta command-line tool
//!
//! Offline utilities around the report exchange core: export a stored
//! report as a wire message, read wire messages back, compare dataset
//! versions and inspect the status machine.

use clap::{Parser, Subcommand};
use collecta_logging::{init_logging, LogConfig};
use std::process::ExitCode;
use tracing::debug;

mod cli;

#[derive(Parser, Debug)]
#[command(name = "collecta", version, about = "Hierarchical report exchange toolkit")]
struct Cli {
    /// Show debug logs on stderr
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export a stored report tree as one wire message
    Export(cli::export::ExportArgs),

    /// Parse a wire message into rows of one table
    Parse(cli::parse::ParseArgs),

    /// Compare two dataset documents and list the amendments
    Compare(cli::compare::CompareArgs),

    /// Show which actions a dataset status permits
    Status(cli::status::StatusArgs),

    /// Validate a configuration file
    CheckConfig(cli::check_config::CheckConfigArgs),
}

fn run_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Export(args) => cli::export::run(args),
        Commands::Parse(args) => cli::parse::run(args),
        Commands::Compare(args) => cli::compare::run(args),
        Commands::Status(args) => cli::status::run(args),
        Commands::CheckConfig(args) => cli::check_config::run(args),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match init_logging(LogConfig {
        app_name: "collecta",
        verbose: cli.verbose,
        log_dir: None,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: logging unavailable: {:#}", err);
            None
        }
    };
    debug!(command = ?cli.command, "Starting");

    match run_command(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<cli::error::HelpfulError>() {
                Some(helpful) => eprint!("{}", helpful),
                None => eprintln!("ERROR: {:#}", err),
            }
            ExitCode::from(1)
        }
    }
}
