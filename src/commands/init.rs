//! `arzt-loadtest init` command implementation.

use anyhow::Result;
use std::path::{Path, PathBuf};

use arzt_loadtest::loadtest::config::ARZT_SCENARIO;

use super::CONFIG_FILE_NAME;

/// Execute the `init` command.
///
/// Writes the built-in Arzt scenario to `path` (default `./loadtest.toml`).
pub fn execute_init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = match path {
        Some(path) => path,
        None => std::env::current_dir()?.join(CONFIG_FILE_NAME),
    };
    write_scenario(&config_path, force)?;

    eprintln!("Created {}", config_path.display());
    eprintln!("Edit the file to customize your load test scenario.");
    Ok(())
}

fn write_scenario(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}\n\
             Use `--force` to overwrite.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::write(config_path, ARZT_SCENARIO)
        .map_err(|e| anyhow::anyhow!("Failed to write {}: {}", config_path.display(), e))?;
    tracing::debug!(path = %config_path.display(), "wrote scenario template");
    Ok(())
}
