//! `arzt-loadtest` CLI subcommands.
//!
//! Provides `run` (execute a load test), `init` (write an editable scenario
//! file), and `ratio` (show how iterations are split across tasks).

mod init;
mod ratio;
mod run;

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use arzt_loadtest::loadtest::config::{LoadTestConfig, DEFAULT_HOST};

/// File name looked up by config auto-discovery and written by `init`.
pub const CONFIG_FILE_NAME: &str = "loadtest.toml";

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a load test against the Arzt REST service
    ///
    /// Uses --config, else a loadtest.toml found in the current directory or
    /// one of its parents, else the built-in Arzt scenario. Prints a summary
    /// and writes a JSON report to ./reports/.
    Run(RunArgs),

    /// Write the built-in Arzt scenario to loadtest.toml for editing
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,

        /// Where to write the scenario (default: ./loadtest.toml)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Show each task's share of iterations and requests per iteration
    Ratio {
        /// Path to config file (default: auto-discover, else built-in)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

/// Arguments for `arzt-loadtest run`.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Base URL of the server, e.g. https://localhost:3000
    #[arg(long, env = "ARZT_HOST")]
    pub host: Option<String>,

    /// Path to config file (default: auto-discover, else built-in)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of virtual users (overrides config)
    #[arg(short = 'u', long)]
    pub users: Option<u32>,

    /// Test duration in seconds (overrides config)
    #[arg(short = 'd', long)]
    pub duration: Option<u64>,

    /// Stop after this many task iterations across all users
    #[arg(short = 'i', long)]
    pub iterations: Option<u64>,

    /// Spread user start-up over this many seconds
    #[arg(long)]
    pub ramp_up: Option<u64>,

    /// Directory for the JSON report
    #[arg(long, default_value = "reports")]
    pub report_dir: PathBuf,

    /// Disable JSON report output
    #[arg(long)]
    pub no_report: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Accept invalid TLS certificates (overrides config)
    #[arg(long, short = 'k')]
    pub insecure: bool,
}

impl Command {
    /// Execute the selected subcommand.
    pub fn execute(self) -> Result<()> {
        match self {
            Command::Run(args) => {
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(run::execute_run(args))
            },
            Command::Init { force, path } => init::execute_init(path, force),
            Command::Ratio { config } => ratio::execute_ratio(config),
        }
    }
}

/// Where a resolved config came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    BuiltIn,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::BuiltIn => f.write_str("built-in Arzt scenario"),
        }
    }
}

/// Load the scenario: explicit path, else auto-discovered file, else built-in.
pub fn resolve_config(explicit: Option<PathBuf>) -> Result<(LoadTestConfig, ConfigSource)> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: {}\nUse `arzt-loadtest init` to create one.",
                    path.display()
                );
            }
            Some(path)
        },
        None => discover_config(&std::env::current_dir()?),
    };

    match path {
        Some(path) => {
            let config = LoadTestConfig::load(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config '{}': {}", path.display(), e))?;
            Ok((config, ConfigSource::File(path)))
        },
        None => {
            let config = LoadTestConfig::arzt_default()
                .map_err(|e| anyhow::anyhow!("Built-in scenario is invalid: {}", e))?;
            Ok((config, ConfigSource::BuiltIn))
        },
    }
}

/// Find `loadtest.toml` by walking parent directories from `start`.
///
/// Stops at the first match or at the filesystem root, like `.git`
/// discovery.
pub fn discover_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Pick the target host: CLI/env, then `settings.host`, then the default.
pub fn resolve_host(cli_host: Option<String>, config: &LoadTestConfig) -> String {
    cli_host
        .or_else(|| config.settings.host.clone())
        .unwrap_or_else(|| DEFAULT_HOST.to_string())
}
