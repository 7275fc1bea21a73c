//! Load test execution engine with metrics aggregation and graceful shutdown.
//!
//! [`LoadTestEngine`] is the top-level orchestrator that:
//! - Spawns N virtual user tasks via [`tokio_util::task::TaskTracker`]
//! - Collects metrics through a bounded mpsc channel
//! - Publishes snapshots through a watch channel for live display
//! - Coordinates graceful shutdown via [`CancellationToken`]
//!
//! The engine supports two execution modes:
//! - **Flat load** (no stages): all VUs start immediately, or staggered over
//!   an optional ramp-up period
//! - **Staged load** (`[[stage]]` blocks): VU count ramps linearly through stages

use crate::loadtest::client::{build_http_client, ArztClient};
use crate::loadtest::config::LoadTestConfig;
use crate::loadtest::display::display_loop;
use crate::loadtest::error::LoadTestError;
use crate::loadtest::metrics::{MetricsRecorder, MetricsSnapshot, RequestSample};
use crate::loadtest::vu::{vu_loop, ActiveVuCounter, IterationCounter, TaskPlan, VuContext};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// How often the aggregator publishes a fresh snapshot to the display.
const DISPLAY_TICK: Duration = Duration::from_secs(2);

/// Grace period added to the staged-mode duration before forcing a stop.
const SAFETY_MARGIN: Duration = Duration::from_secs(30);

/// Sample channel slots reserved per VU.
const SAMPLES_PER_VU: usize = 100;

fn _assert_send<T: Send>() {}
#[allow(dead_code)]
fn _check_send_bounds() {
    _assert_send::<RequestSample>();
    _assert_send::<MetricsSnapshot>();
    _assert_send::<DisplayState>();
}

/// Display state published through the watch channel to the live terminal display.
#[derive(Debug, Clone)]
pub struct DisplayState {
    /// Current metrics snapshot.
    pub snapshot: MetricsSnapshot,
    /// Current stage label (e.g., `"stage 2/3"`), or `None` for flat load.
    pub stage_label: Option<String>,
    /// VU count the engine is currently aiming for.
    pub target_vus: u32,
    /// Completed task iterations so far.
    pub iterations: u64,
}

/// Stage progress shared between the scheduler and the aggregator.
#[derive(Debug, Clone, PartialEq)]
struct StageStatus {
    label: Option<String>,
    target_vus: u32,
}

/// Result of a completed load test run.
#[derive(Debug)]
pub struct LoadTestResult {
    /// Final metrics snapshot (excludes ramp-up if applicable).
    pub snapshot: MetricsSnapshot,
    /// Total elapsed time of the test.
    pub elapsed: Duration,
    /// Completed task iterations across all VUs.
    pub iterations: u64,
    /// Number of VUs that were still active at test end.
    pub final_active_vus: u32,
}

/// Channels, counters and tokens shared by one test run.
struct Run {
    cancel: CancellationToken,
    tracker: TaskTracker,
    active_vus: ActiveVuCounter,
    iterations: Arc<IterationCounter>,
    vu_ctx: VuContext,
    test_start: Instant,
}

/// Top-level load test engine configuration and entry point.
///
/// Spawns virtual users as independent tokio tasks, collects metrics
/// through a bounded mpsc channel, and publishes snapshots through a
/// watch channel for live display consumption.
pub struct LoadTestEngine {
    config: LoadTestConfig,
    host: String,
    max_iterations: Option<u64>,
    ramp_up: Option<Duration>,
    no_color: bool,
    live_display: bool,
}

impl LoadTestEngine {
    /// Creates a new engine with the given configuration and target host.
    pub fn new(config: LoadTestConfig, host: String) -> Self {
        Self {
            config,
            host,
            max_iterations: None,
            ramp_up: None,
            no_color: false,
            live_display: true,
        }
    }

    /// Sets an iteration limit. The test stops after this many total task
    /// iterations across all VUs (first-limit-wins with duration).
    pub fn with_iterations(mut self, n: u64) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Sets a ramp-up duration. VUs are spawned with uniform stagger over this
    /// period. Ramp-up metrics are excluded from the final report.
    /// Only applies to flat load mode (no stages).
    pub fn with_ramp_up(mut self, duration: Duration) -> Self {
        self.ramp_up = Some(duration);
        self
    }

    /// Disables colored output.
    pub fn with_no_color(mut self, no_color: bool) -> Self {
        self.no_color = no_color;
        self
    }

    /// Enables or disables the live terminal status line.
    pub fn with_live_display(mut self, enabled: bool) -> Self {
        self.live_display = enabled;
        self
    }

    /// Returns a reference to the engine's configuration.
    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// Returns the target host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the configured max iterations, if any.
    pub fn max_iterations(&self) -> Option<u64> {
        self.max_iterations
    }

    /// Returns the configured ramp-up duration, if any.
    pub fn ramp_up(&self) -> Option<Duration> {
        self.ramp_up
    }

    /// Returns whether colored output is disabled.
    pub fn no_color(&self) -> bool {
        self.no_color
    }

    /// Run the load test and return the final result.
    ///
    /// Branches on whether `[[stage]]` blocks are configured:
    /// - **Staged**: runs the stage scheduler with per-VU cancellation tokens
    /// - **Flat**: spawns `virtual_users` VUs with optional ramp-up
    pub async fn run(&self) -> Result<LoadTestResult, LoadTestError> {
        self.config.validate()?;
        if self.config.has_stages() {
            if self.ramp_up.is_some() {
                tracing::warn!("--ramp-up is ignored when [[stage]] blocks are configured");
            }
            self.run_staged().await
        } else {
            self.run_flat().await
        }
    }

    /// Build the HTTP client, channels and counters shared by both modes.
    fn prepare(
        &self,
        max_vus: u32,
    ) -> Result<(Run, mpsc::Receiver<RequestSample>), LoadTestError> {
        let http = build_http_client(&self.config.settings)?;
        let client = ArztClient::new(http, &self.host)?;
        tracing::info!(host = %client.base_url(), "starting load test");

        let cancel = CancellationToken::new();
        let active_vus = ActiveVuCounter::new();
        let iterations = Arc::new(IterationCounter::new());
        let buffer_size = (max_vus.max(1) as usize) * SAMPLES_PER_VU;
        let (sample_tx, sample_rx) = mpsc::channel::<RequestSample>(buffer_size);

        let vu_ctx = VuContext {
            tasks: TaskPlan::from_config(&self.config).into(),
            wait_time: self.config.settings.wait_time.clone(),
            client,
            sample_tx,
            iterations: iterations.clone(),
            max_iterations: self.max_iterations,
            stop: cancel.clone(),
            active_vus: active_vus.clone(),
        };

        let run = Run {
            cancel,
            tracker: TaskTracker::new(),
            active_vus,
            iterations,
            vu_ctx,
            test_start: Instant::now(),
        };
        Ok((run, sample_rx))
    }

    /// Spawn the aggregator and (optionally) the live display.
    fn spawn_observers(
        &self,
        run: &Run,
        sample_rx: mpsc::Receiver<RequestSample>,
        ramp_up_end: Instant,
        stage_rx: watch::Receiver<StageStatus>,
    ) -> (
        tokio::task::JoinHandle<()>,
        Option<tokio::task::JoinHandle<()>>,
        watch::Receiver<DisplayState>,
    ) {
        let initial = {
            let stage = stage_rx.borrow();
            DisplayState {
                snapshot: MetricsSnapshot::default(),
                stage_label: stage.label.clone(),
                target_vus: stage.target_vus,
                iterations: 0,
            }
        };
        let (display_tx, display_rx) = watch::channel(initial);

        // NOT on the tracker -- the aggregator must outlive the VU tasks
        let aggregator = tokio::spawn(metrics_aggregator(
            sample_rx,
            display_tx,
            run.cancel.clone(),
            self.config.settings.expected_interval_ms,
            ramp_up_end,
            stage_rx,
            run.iterations.clone(),
        ));

        let display = self.live_display.then(|| {
            tokio::spawn(display_loop(
                display_rx.clone(),
                run.active_vus.clone(),
                run.cancel.clone(),
                self.no_color,
                run.test_start,
            ))
        });

        (aggregator, display, display_rx)
    }

    /// Run in flat load mode (no stages).
    async fn run_flat(&self) -> Result<LoadTestResult, LoadTestError> {
        let vu_count = self.config.settings.virtual_users;
        if self.config.settings.duration_secs == 0 && self.max_iterations.is_none() {
            tracing::warn!("duration_secs is 0 and no iteration limit is set; the test ends immediately");
        }
        let (run, sample_rx) = self.prepare(vu_count)?;

        let (_stage_tx, stage_rx) = watch::channel(StageStatus {
            label: None,
            target_vus: vu_count,
        });
        let ramp_up_end = run.test_start + self.ramp_up.unwrap_or(Duration::ZERO);
        let (aggregator, display, display_rx) =
            self.spawn_observers(&run, sample_rx, ramp_up_end, stage_rx);

        // Run controller -- first-limit-wins between duration, iteration
        // limit (VUs cancel the root token), every VU exiting, and Ctrl+C.
        let duration = Duration::from_secs(self.config.settings.duration_secs);
        let deadline = tokio::time::Instant::from_std(run.test_start) + duration;
        let spawn_and_wait = async {
            let delay_per_vu = match self.ramp_up {
                Some(ramp) if vu_count > 1 => ramp / vu_count,
                _ => Duration::ZERO,
            };
            for i in 0..vu_count {
                if run.cancel.is_cancelled() {
                    break;
                }
                run.tracker
                    .spawn(vu_loop(i, run.vu_ctx.clone(), run.cancel.child_token()));
                if i + 1 < vu_count && !delay_per_vu.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay_per_vu) => {},
                        _ = run.cancel.cancelled() => break,
                    }
                }
            }
            run.tracker.close();
            run.tracker.wait().await;
        };

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                tracing::info!("test duration elapsed");
            },
            _ = run.cancel.cancelled() => {},
            _ = spawn_and_wait => {
                tracing::info!("all virtual users finished");
            },
            _ = handle_ctrl_c(run.cancel.clone()) => {},
        }

        self.finish(run, aggregator, display, display_rx).await
    }

    /// Run in staged load mode -- ramps VU count through `[[stage]]` blocks.
    ///
    /// For each stage, the scheduler:
    /// 1. Computes how many VUs to add or remove to reach `target_vus`.
    /// 2. **Ramp up**: spawns VUs with linear stagger, each getting a `child_token()`.
    /// 3. **Ramp down**: cancels VU tokens in LIFO order (last spawned, first killed).
    /// 4. **Hold**: waits for remaining stage duration.
    async fn run_staged(&self) -> Result<LoadTestResult, LoadTestError> {
        if self.config.settings.virtual_users > 0 {
            tracing::warn!(
                "settings.virtual_users and settings.duration_secs are ignored when [[stage]] blocks are configured"
            );
        }
        let max_stage_vus = self
            .config
            .stage
            .iter()
            .map(|s| s.target_vus)
            .max()
            .unwrap_or(1);
        let (run, sample_rx) = self.prepare(max_stage_vus)?;

        let total_stages = self.config.stage.len();
        let (stage_tx, stage_rx) = watch::channel(StageStatus {
            label: Some(format!("stage 1/{total_stages}")),
            target_vus: self.config.stage.first().map_or(0, |s| s.target_vus),
        });
        // All stage data is part of the test shape; nothing is excluded
        let ramp_up_end = run.test_start;
        let (aggregator, display, display_rx) =
            self.spawn_observers(&run, sample_rx, ramp_up_end, stage_rx);

        let safety_timeout =
            Duration::from_secs(self.config.effective_duration_secs()) + SAFETY_MARGIN;

        let scheduler = async {
            // Per-VU cancellation tokens for selective ramp-down (LIFO order)
            let mut vu_tokens: Vec<CancellationToken> = Vec::new();
            let mut next_vu_id: u32 = 0;

            for (stage_idx, stage) in self.config.stage.iter().enumerate() {
                let stage_start = Instant::now();
                let stage_duration = Duration::from_secs(stage.duration_secs);
                let target = stage.target_vus;
                let current = vu_tokens.len() as u32;

                stage_tx.send_replace(StageStatus {
                    label: Some(format!("stage {}/{}", stage_idx + 1, total_stages)),
                    target_vus: target,
                });
                tracing::info!(stage = stage_idx + 1, target_vus = target, "entering stage");

                if target > current {
                    let vus_to_spawn = target - current;
                    let delay_per_vu = if vus_to_spawn > 1 {
                        stage_duration / vus_to_spawn
                    } else {
                        Duration::ZERO
                    };

                    for spawn_idx in 0..vus_to_spawn {
                        if run.cancel.is_cancelled() {
                            return;
                        }
                        let child = run.cancel.child_token();
                        vu_tokens.push(child.clone());
                        run.tracker
                            .spawn(vu_loop(next_vu_id, run.vu_ctx.clone(), child));
                        next_vu_id += 1;

                        // Stagger between spawns (not after last)
                        if spawn_idx + 1 < vus_to_spawn {
                            tokio::select! {
                                _ = tokio::time::sleep(delay_per_vu) => {},
                                _ = run.cancel.cancelled() => return,
                            }
                        }
                    }
                } else if target < current {
                    for _ in 0..(current - target) {
                        if let Some(token) = vu_tokens.pop() {
                            token.cancel();
                        }
                    }
                }

                let elapsed_in_stage = stage_start.elapsed();
                if elapsed_in_stage < stage_duration {
                    tokio::select! {
                        _ = tokio::time::sleep(stage_duration - elapsed_in_stage) => {},
                        _ = run.cancel.cancelled() => return,
                    }
                }
            }
        };

        tokio::select! {
            _ = scheduler => {},
            _ = tokio::time::sleep(safety_timeout) => {
                tracing::warn!("safety timeout reached, stopping test");
            },
            _ = handle_ctrl_c(run.cancel.clone()) => {},
        }

        self.finish(run, aggregator, display, display_rx).await
    }

    /// Cancel everything, drain the VUs, and collect the final snapshot.
    async fn finish(
        &self,
        run: Run,
        aggregator: tokio::task::JoinHandle<()>,
        display: Option<tokio::task::JoinHandle<()>>,
        display_rx: watch::Receiver<DisplayState>,
    ) -> Result<LoadTestResult, LoadTestError> {
        let Run {
            cancel,
            tracker,
            active_vus,
            iterations,
            vu_ctx,
            test_start,
            ..
        } = run;

        cancel.cancel();
        // Drop the engine's sender clone so the aggregator sees the channel close
        drop(vu_ctx);

        tracker.close();
        tracker.wait().await;

        if let Err(e) = aggregator.await {
            tracing::error!("metrics aggregator failed: {e}");
        }
        if let Some(display) = display {
            let _ = display.await;
        }

        let final_snapshot = display_rx.borrow().snapshot.clone();
        Ok(LoadTestResult {
            snapshot: final_snapshot,
            elapsed: test_start.elapsed(),
            iterations: iterations.completed(),
            final_active_vus: active_vus.get(),
        })
    }
}

/// Metrics aggregator task.
///
/// Consumes [`RequestSample`] values from the mpsc channel, records them
/// into dual recorders (live + report), and publishes [`DisplayState`] via the
/// watch channel every 2 seconds.
///
/// Uses `biased;` select so the tick branch is checked first, preventing
/// display starvation when the mpsc channel is busy.
///
/// The dual-recorder pattern excludes ramp-up samples from the final report:
/// - `live` records ALL samples (for live display)
/// - `report` records only post-ramp-up samples (for final result)
///
/// The last value published is always the `report` snapshot.
async fn metrics_aggregator(
    mut sample_rx: mpsc::Receiver<RequestSample>,
    display_tx: watch::Sender<DisplayState>,
    cancel: CancellationToken,
    expected_interval_ms: Option<u64>,
    ramp_up_end: Instant,
    stage_rx: watch::Receiver<StageStatus>,
    iterations: Arc<IterationCounter>,
) {
    let mut recorders = DualRecorder::new(expected_interval_ms, ramp_up_end);
    let mut tick = tokio::time::interval(DISPLAY_TICK);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let publish = |snapshot: MetricsSnapshot| {
        let stage = stage_rx.borrow().clone();
        let _ = display_tx.send(DisplayState {
            snapshot,
            stage_label: stage.label,
            target_vus: stage.target_vus,
            iterations: iterations.completed(),
        });
    };

    loop {
        tokio::select! {
            biased;

            _ = tick.tick() => {
                // Drain all available samples before publishing a snapshot
                while let Ok(sample) = sample_rx.try_recv() {
                    recorders.ingest(&sample);
                }
                publish(recorders.live.snapshot());
            }
            result = sample_rx.recv() => {
                match result {
                    Some(sample) => recorders.ingest(&sample),
                    // All senders dropped -- VUs are done
                    None => break,
                }
            }
            _ = cancel.cancelled() => {
                // Wait for in-flight VUs to hand over their last samples
                while let Some(sample) = sample_rx.recv().await {
                    recorders.ingest(&sample);
                }
                break;
            }
        }
    }

    publish(recorders.report.snapshot());
}

/// `live` records every sample; `report` only those taken after ramp-up.
struct DualRecorder {
    live: MetricsRecorder,
    report: MetricsRecorder,
    ramp_up_end: Instant,
}

impl DualRecorder {
    fn new(expected_interval_ms: Option<u64>, ramp_up_end: Instant) -> Self {
        Self {
            live: MetricsRecorder::new(expected_interval_ms),
            report: MetricsRecorder::new(expected_interval_ms),
            ramp_up_end,
        }
    }

    fn ingest(&mut self, sample: &RequestSample) {
        if sample.timestamp >= self.ramp_up_end {
            self.report.record(sample);
        }
        self.live.record(sample);
    }
}

/// Ctrl+C handler with two-phase shutdown.
///
/// First Ctrl+C triggers graceful drain via the cancellation token.
/// Second Ctrl+C performs a hard abort via `std::process::exit(1)`.
async fn handle_ctrl_c(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to install Ctrl+C handler: {e}");
        std::future::pending::<()>().await;
    }
    eprintln!("\nReceived Ctrl+C, stopping gracefully...");
    cancel.cancel();

    if tokio::signal::ctrl_c().await.is_ok() {
        eprintln!("\nReceived second Ctrl+C, aborting immediately.");
        std::process::exit(1);
    }
}
