//! arzt-loadtest: load generator for the Arzt REST service
//!
//! Simulates concurrent users issuing weighted GET requests against the
//! `/rest` endpoints, paced at a constant throughput per user.

use anyhow::Result;
use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

mod commands;

/// Load generator for the Arzt REST service
#[derive(Parser)]
#[command(name = "arzt-loadtest")]
#[command(about = "Load test the Arzt REST service", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: commands::Command,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    cli.command.execute()
}

/// Initialize logging on stderr so it does not mix with the summary on stdout.
fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
