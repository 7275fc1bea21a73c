//! `arzt-loadtest run` command implementation.

use anyhow::Result;
use std::io::IsTerminal;
use std::time::Duration;

use arzt_loadtest::loadtest::config::LoadTestConfig;
use arzt_loadtest::loadtest::engine::LoadTestEngine;
use arzt_loadtest::loadtest::report::{write_report, LoadTestReport};
use arzt_loadtest::loadtest::summary::render_summary;

use super::{resolve_config, resolve_host, RunArgs};

/// Execute the `run` command.
///
/// Loads the config, applies CLI overrides, runs the engine, prints the
/// summary, and writes the JSON report.
pub async fn execute_run(args: RunArgs) -> Result<()> {
    let (mut config, source) = resolve_config(args.config.clone())?;
    eprintln!("Loading config from: {source}");

    apply_overrides(&mut config, &args);
    let host = resolve_host(args.host.clone(), &config);
    tracing::debug!(%host, users = config.settings.virtual_users, "resolved run settings");

    let mut engine = LoadTestEngine::new(config, host.clone()).with_no_color(args.no_color);
    if let Some(n) = args.iterations {
        engine = engine.with_iterations(n);
    }
    if let Some(secs) = args.ramp_up {
        engine = engine.with_ramp_up(Duration::from_secs(secs));
    }

    let result = engine
        .run()
        .await
        .map_err(|e| anyhow::anyhow!("Load test failed: {}", e))?;

    if args.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }
    println!("{}", render_summary(&result, engine.config(), &host));

    if !args.no_report {
        let report = LoadTestReport::from_result(&result, engine.config(), &host);
        match write_report(&report, &args.report_dir) {
            Ok(path) => {
                eprintln!();
                eprintln!("Report written to: {}", path.display());
            },
            Err(e) => {
                // Non-fatal -- the test itself completed
                tracing::warn!("failed to write report to {}: {e}", args.report_dir.display());
            },
        }
    }

    Ok(())
}

/// Apply CLI flag overrides to a loaded config.
///
/// When stages are present, `--users` is ignored (stages define VU targets).
fn apply_overrides(config: &mut LoadTestConfig, args: &RunArgs) {
    if let Some(users) = args.users {
        if config.has_stages() {
            tracing::warn!(
                "--users={users} ignored because config contains [[stage]] blocks (stages define VU targets)"
            );
        } else {
            config.settings.virtual_users = users;
        }
    }
    if let Some(duration) = args.duration {
        if config.has_stages() {
            tracing::warn!("--duration={duration} ignored because config contains [[stage]] blocks");
        } else {
            config.settings.duration_secs = duration;
        }
    }
    if args.insecure {
        config.settings.insecure = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arzt_loadtest::loadtest::config::Stage;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: RunArgs,
    }

    fn args(argv: &[&str]) -> RunArgs {
        let mut full = vec!["run"];
        full.extend_from_slice(argv);
        TestCli::parse_from(full).args
    }

    fn plain_config() -> LoadTestConfig {
        let mut config = LoadTestConfig::arzt_default().unwrap();
        config.settings.insecure = false;
        config
    }

    #[test]
    fn test_parse_defaults() {
        let args = args(&[]);
        assert_eq!(args.report_dir, std::path::PathBuf::from("reports"));
        assert!(!args.no_report);
        assert!(!args.insecure);
        assert_eq!(args.iterations, None);
    }

    #[test]
    fn test_apply_overrides_users_and_duration() {
        let mut config = plain_config();
        apply_overrides(&mut config, &args(&["--users", "50", "--duration", "120"]));
        assert_eq!(config.settings.virtual_users, 50);
        assert_eq!(config.settings.duration_secs, 120);
    }

    #[test]
    fn test_apply_overrides_none() {
        let mut config = plain_config();
        apply_overrides(&mut config, &args(&[]));
        assert_eq!(config.settings.virtual_users, 500);
        assert_eq!(config.settings.duration_secs, 60);
        assert!(!config.settings.insecure);
    }

    #[test]
    fn test_apply_overrides_insecure() {
        let mut config = plain_config();
        apply_overrides(&mut config, &args(&["-k"]));
        assert!(config.settings.insecure);
    }

    #[test]
    fn test_apply_overrides_users_ignored_with_stages() {
        let mut config = plain_config();
        config.stage = vec![Stage {
            target_vus: 5,
            duration_secs: 10,
        }];
        apply_overrides(&mut config, &args(&["-u", "50"]));
        assert_eq!(config.settings.virtual_users, 500);
    }
}
