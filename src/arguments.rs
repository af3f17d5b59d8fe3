/// Command-line arguments
///
/// Subcommands and options are parsed with clap. Logging flags (`--debug-<tag>`,
/// `--debug-all`, `--verbose`) are open-ended, so they are pulled out of the raw
/// argument list first and handed to the logger.
use crate::config::CONFIG_FILE_PATH;
use crate::logger::{config_from_args, LoggerConfig};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "swapguard", version, about = "Decision-to-execution swap pipeline")]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, default_value = CONFIG_FILE_PATH)]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run one recommendation through the pipeline and print the outcome as JSON
    Process {
        /// File holding the recommendation text, or `-` for stdin
        #[arg(long)]
        decision_file: String,
    },
    /// Settle PENDING trades against the ledger
    Reconcile,
}

fn is_logging_flag(arg: &str) -> bool {
    arg == "--verbose" || arg.starts_with("--debug-")
}

/// Split raw arguments into (clap arguments, logging flags)
pub fn split_logging_flags(args: Vec<String>) -> (Vec<String>, Vec<String>) {
    args.into_iter().partition(|arg| !is_logging_flag(arg))
}

/// Parse the full argument list, program name included
pub fn parse_from(args: Vec<String>) -> Result<(Cli, LoggerConfig), clap::Error> {
    let (cli_args, logging_flags) = split_logging_flags(args);
    let cli = Cli::try_parse_from(cli_args)?;
    Ok((cli, config_from_args(&logging_flags)))
}
