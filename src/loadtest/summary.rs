//! Terminal summary renderer for load test results.
//!
//! [`render_summary`] is a pure function: it takes structured data and
//! returns a formatted [`String`], with no I/O. Color coding is applied via
//! the `colored` crate, which respects the global override set by
//! `colored::control::set_override(false)` when `--no-color` is active or
//! output is piped.

use colored::Colorize;

use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::engine::LoadTestResult;

/// Width for dotted metric row padding.
const PAD_WIDTH: usize = 36;

/// Width of the endpoint column in the per-endpoint table.
const LABEL_WIDTH: usize = 30;

/// Render the end-of-run summary.
///
/// # Layout
///
/// ```text
///   arzt-loadtest
///   ─────────────────────────────────────────
///   target:    https://localhost:3000
///   vus:       500
///   duration:  60s
///   tasks:     3 (get_id:100, get_praxis:200, get_name:150)
///   wait time: constant_throughput(0.1/s)
///
///   http_req_duration...................: p50=45ms  p95=200ms  p99=450ms
///   http_req_success_count..............: 950
///   http_req_error_count................: 50
///   http_req_error_rate.................: 5.0%
///   http_req_throughput.................: 15.8 req/s
///   iterations..........................: 180
///   http_req_total......................: 1000
///   elapsed.............................: 60.0s
///
///   errors:
///     http..............................: 45  (4xx: 40, 5xx: 5)
///     timeout...........................: 5
/// ```
pub fn render_summary(result: &LoadTestResult, config: &LoadTestConfig, host: &str) -> String {
    let snap = &result.snapshot;
    let elapsed_secs = result.elapsed.as_secs_f64();
    let per_sec = |n: u64| {
        if elapsed_secs > 0.0 {
            n as f64 / elapsed_secs
        } else {
            0.0
        }
    };

    let mut lines = vec![render_header(config, host)];

    let latency = format!("p50={}ms  p95={}ms  p99={}ms", snap.p50, snap.p95, snap.p99);
    let latency = if snap.p99 < 1000 {
        latency.green()
    } else {
        latency.yellow()
    };
    lines.push(format_metric_row("http_req_duration", &latency.to_string()));
    if snap.error_count > 0 {
        lines.push(format_metric_row(
            "http_req_failed_duration",
            &format!(
                "p50={}ms  p95={}ms  p99={}ms",
                snap.error_p50, snap.error_p95, snap.error_p99
            ),
        ));
    }

    lines.push(format_metric_row(
        "http_req_success_count",
        &snap.success_count.to_string().green().to_string(),
    ));

    let error_count = if snap.error_count > 0 {
        snap.error_count.to_string().red().to_string()
    } else {
        snap.error_count.to_string()
    };
    lines.push(format_metric_row("http_req_error_count", &error_count));

    let error_rate_pct = snap.error_rate * 100.0;
    lines.push(format_metric_row(
        "http_req_error_rate",
        &colored_rate(error_rate_pct),
    ));

    lines.push(format_metric_row(
        "http_req_throughput",
        &format!("{:.1} req/s", per_sec(snap.total_requests))
            .green()
            .to_string(),
    ));
    lines.push(format_metric_row(
        "iterations",
        &format!("{}  ({:.2}/s)", result.iterations, per_sec(result.iterations)),
    ));
    lines.push(format_metric_row(
        "http_req_total",
        &snap.total_requests.to_string(),
    ));
    lines.push(format_metric_row("elapsed", &format!("{elapsed_secs:.1}s")));

    if !snap.error_category_counts.is_empty() {
        lines.push(String::new());
        lines.push("  errors:".to_string());
        let mut categories: Vec<_> = snap.error_category_counts.iter().collect();
        categories.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (category, count) in categories {
            let mut value = count.to_string().red().to_string();
            if category == "http" && snap.http_4xx + snap.http_5xx > 0 {
                value.push_str(&format!("  (4xx: {}, 5xx: {})", snap.http_4xx, snap.http_5xx));
            }
            lines.push(format_metric_row(&format!("  {category}"), &value));
        }
    }

    if !snap.per_task.is_empty() {
        lines.push(String::new());
        lines.push("  tasks:".to_string());
        for task in &snap.per_task {
            lines.push(format_metric_row(
                &format!("  {}", task.name),
                &format!("{} requests, {} failed", task.requests, task.errors),
            ));
        }
    }

    if !snap.per_endpoint.is_empty() {
        lines.push(String::new());
        lines.push("  per-endpoint metrics:".to_string());
        lines.push(String::new());
        lines.push(format!(
            "  {:<LABEL_WIDTH$} {:>6} {:>9} {:>6} {:>7} {:>7} {:>7} {:>7}",
            "endpoint", "reqs", "rate", "err%", "p50", "p95", "p99", "max"
        ));
        lines.push(format!("  {}", "\u{2500}".repeat(LABEL_WIDTH + 56)));

        for endpoint in &snap.per_endpoint {
            let p99 = format!("{}ms", endpoint.p99);
            let p99 = if endpoint.p99 > 1000 {
                p99.yellow()
            } else {
                p99.green()
            };
            lines.push(format!(
                "  {:<LABEL_WIDTH$} {:>6} {:>9} {:>6} {:>7} {:>7} {:>7} {:>7}",
                truncate_label(&endpoint.label),
                endpoint.total_requests,
                format!("{:.1}/s", per_sec(endpoint.total_requests)),
                colored_rate(endpoint.error_rate * 100.0),
                format!("{}ms", endpoint.p50),
                format!("{}ms", endpoint.p95),
                p99,
                format!("{}ms", endpoint.max),
            ));
        }
    }

    lines.join("\n")
}

/// Render the header block with the test configuration.
fn render_header(config: &LoadTestConfig, host: &str) -> String {
    let vus = if config.has_stages() {
        let peak = config.stage.iter().map(|s| s.target_vus).max().unwrap_or(0);
        format!("{peak} (peak over {} stages)", config.stage.len())
    } else {
        config.settings.virtual_users.to_string()
    };
    let tasks = config
        .task
        .iter()
        .map(|t| format!("{}:{}", t.name(), t.weight()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "\n  {}\n  {}\n  target:    {host}\n  vus:       {vus}\n  duration:  {}s\n  tasks:     {} ({tasks})\n  wait time: {}\n",
        "arzt-loadtest".bold(),
        "\u{2500}".repeat(41),
        config.effective_duration_secs(),
        config.task.len(),
        config.settings.wait_time,
    )
}

/// Error-rate percentage colored green/yellow/red at the 1% and 5% marks.
fn colored_rate(pct: f64) -> String {
    let s = format!("{pct:.1}%");
    if pct > 5.0 {
        s.red().to_string()
    } else if pct > 1.0 {
        s.yellow().to_string()
    } else {
        s.green().to_string()
    }
}

fn truncate_label(label: &str) -> String {
    if label.chars().count() > LABEL_WIDTH {
        let head: String = label.chars().take(LABEL_WIDTH - 3).collect();
        format!("{head}...")
    } else {
        label.to_string()
    }
}

/// Format a single metric row with dot-padding.
///
/// Produces: `"  metric_name..................: value_string"`
fn format_metric_row(name: &str, value: &str) -> String {
    format!("  {name:.<PAD_WIDTH$}: {value}")
}
