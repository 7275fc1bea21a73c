//! `arzt-loadtest ratio` command implementation.

use anyhow::Result;
use std::path::PathBuf;

use arzt_loadtest::loadtest::config::LoadTestConfig;

use super::resolve_config;

/// Execute the `ratio` command: print the task mix of the resolved config.
pub fn execute_ratio(config_path: Option<PathBuf>) -> Result<()> {
    let (config, source) = resolve_config(config_path)?;
    eprintln!("Loading config from: {source}");
    println!("{}", render_ratio(&config));
    Ok(())
}

/// Render each task's share of iterations, its requests per iteration, and
/// the request rate the pacing allows at full load.
fn render_ratio(config: &LoadTestConfig) -> String {
    let total_weight = config.total_weight() as f64;
    let mut lines = vec![
        "  Task ratio per user".to_string(),
        format!(
            "  {:<24} {:>7} {:>8} {:>13}",
            "task", "weight", "share", "reqs/iter"
        ),
    ];

    let mut weighted_requests = 0.0;
    for task in &config.task {
        let share = f64::from(task.weight()) / total_weight;
        weighted_requests += share * task.request_count() as f64;
        lines.push(format!(
            "  {:<24} {:>7} {:>7.1}% {:>13}",
            task.name(),
            task.weight(),
            share * 100.0,
            task.request_count()
        ));
    }

    lines.push(String::new());
    lines.push(format!(
        "  requests per iteration (avg): {weighted_requests:.2}"
    ));

    if let Some(interval) = config.settings.wait_time.pacing_interval() {
        let peak_vus = if config.has_stages() {
            config.stage.iter().map(|s| s.target_vus).max().unwrap_or(0)
        } else {
            config.settings.virtual_users
        };
        let iterations_per_sec = f64::from(peak_vus) / interval.as_secs_f64();
        lines.push(format!(
            "  max rate at {peak_vus} users ({}): {iterations_per_sec:.1} iterations/s, {:.1} requests/s",
            config.settings.wait_time,
            iterations_per_sec * weighted_requests
        ));
    }

    lines.join("\n")
}
