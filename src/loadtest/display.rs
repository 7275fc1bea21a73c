//! Live terminal status line for load test progress.
//!
//! Renders a compact, in-place updating spinner line showing active VU
//! count, requests per second, P95 latency, error count/rate, completed
//! iterations, and elapsed time. Updates come from the engine's watch
//! channel every 2 seconds, not per request.
//!
//! When stages are active, a `[stage N/M]` prefix is shown.

use crate::loadtest::engine::DisplayState;
use crate::loadtest::vu::ActiveVuCounter;

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::IsTerminal;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// P95 latency above which the value is highlighted.
const SLOW_P95_MS: u64 = 1000;

/// Spinner-based live status display on stderr.
pub struct LiveDisplay {
    status_bar: ProgressBar,
}

impl LiveDisplay {
    /// Create a new live display.
    ///
    /// If `no_color` is true or stderr is not a terminal (piped),
    /// color output is disabled.
    pub fn new(no_color: bool) -> Self {
        if no_color || !std::io::stderr().is_terminal() {
            colored::control::set_override(false);
        }

        let status_bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        status_bar.set_style(style);
        status_bar.enable_steady_tick(Duration::from_millis(100));

        Self { status_bar }
    }

    /// Format a single line of live status.
    ///
    /// Color coding: red for errors (when any occurred), yellow for P95
    /// above one second, green otherwise.
    pub fn format_status(state: &DisplayState, elapsed: Duration, active_vus: u32) -> String {
        let snap = &state.snapshot;
        let elapsed_secs = elapsed.as_secs_f64();
        let rps = if elapsed_secs > 0.0 {
            snap.total_requests as f64 / elapsed_secs
        } else {
            0.0
        };

        let vu_str = format!("{active_vus}/{}", state.target_vus).green();
        let rps_str = format!("{rps:.1}").green();
        let p95_str = format!("{}ms", snap.p95);
        let p95_str = if snap.p95 > SLOW_P95_MS {
            p95_str.yellow()
        } else {
            p95_str.green()
        };
        let error_count = snap.error_count.to_string();
        let error_rate = format!("{:.1}%", snap.error_rate * 100.0);
        let errors = if snap.error_count > 0 {
            format!("{} ({})", error_count.red(), error_rate.red())
        } else {
            format!("{error_count} ({error_rate})")
        };

        let metrics_line = format!(
            "vus: {vu_str}  |  rps: {rps_str}  |  p95: {p95_str}  |  errors: {errors}  |  iterations: {}  |  elapsed: {}s",
            state.iterations,
            elapsed.as_secs()
        );

        match state.stage_label.as_deref() {
            Some(label) => format!("  [{label}]  {metrics_line}"),
            None => format!("  {metrics_line}"),
        }
    }

    /// Update the display with the latest state.
    pub fn update(&self, state: &DisplayState, elapsed: Duration, active_vus: u32) {
        self.status_bar
            .set_message(Self::format_status(state, elapsed, active_vus));
    }

    /// Stop the display and clear the spinner.
    pub fn finish(&self) {
        self.status_bar.finish_and_clear();
    }
}

/// Run the live display loop.
///
/// Redraws whenever the watch channel publishes a new [`DisplayState`].
/// Stops when the [`CancellationToken`] is cancelled or the sender is dropped.
pub async fn display_loop(
    mut display_rx: watch::Receiver<DisplayState>,
    active_vus: ActiveVuCounter,
    cancel: CancellationToken,
    no_color: bool,
    test_start: Instant,
) {
    let display = LiveDisplay::new(no_color);

    eprintln!();
    eprintln!("  Running load test...");
    eprintln!();

    loop {
        tokio::select! {
            result = display_rx.changed() => {
                if result.is_err() {
                    // Sender dropped, test is ending
                    break;
                }
                let state = display_rx.borrow_and_update().clone();
                display.update(&state, test_start.elapsed(), active_vus.get());
            }
            _ = cancel.cancelled() => {
                let state = display_rx.borrow().clone();
                display.update(&state, test_start.elapsed(), active_vus.get());
                break;
            }
        }
    }

    display.finish();
}
