//! Virtual user (VU) task loop for load test execution.
//!
//! Each VU independently picks weighted-random tasks, issues the task's GET
//! requests in order, and then waits according to the scenario's wait time.
//! Metrics are emitted as [`RequestSample`] values through a bounded mpsc
//! channel. A failed request is recorded and the VU carries on.

use crate::loadtest::client::ArztClient;
use crate::loadtest::config::{LoadTestConfig, RequestSpec, WaitTime};
use crate::loadtest::metrics::RequestSample;
use crate::loadtest::pacing::Pacer;

use rand::distr::weighted::{Error as WeightError, WeightedIndex};
use rand::prelude::*;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Atomic counter tracking the number of currently active virtual users.
///
/// Lightweight wrapper around `Arc<AtomicU32>` for clone-friendly sharing
/// across VU tasks and the engine orchestrator.
#[derive(Clone)]
pub struct ActiveVuCounter(Arc<AtomicU32>);

impl ActiveVuCounter {
    /// Creates a new counter initialized to zero.
    pub fn new() -> Self {
        Self(Arc::new(AtomicU32::new(0)))
    }

    /// Increments the active VU count by one.
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrements the active VU count by one.
    pub fn decrement(&self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns the current number of active VUs.
    pub fn get(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ActiveVuCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A task with its requests expanded once up front.
#[derive(Debug, Clone)]
pub struct TaskPlan {
    pub name: String,
    pub weight: u32,
    pub requests: Vec<RequestSpec>,
}

impl TaskPlan {
    /// Expand every task in the config, preserving declaration order.
    pub fn from_config(config: &LoadTestConfig) -> Vec<Self> {
        config
            .task
            .iter()
            .map(|task| Self {
                name: task.name().to_owned(),
                weight: task.weight(),
                requests: task.requests(),
            })
            .collect()
    }
}

/// Weighted task selection: a task's weight is its relative pick frequency.
///
/// Zero-weight tasks are never picked.
#[derive(Debug, Clone)]
pub struct TaskPicker {
    dist: WeightedIndex<u32>,
}

impl TaskPicker {
    /// Fails when every weight is zero.
    pub fn new(tasks: &[TaskPlan]) -> Result<Self, WeightError> {
        let dist = WeightedIndex::new(tasks.iter().map(|t| t.weight))?;
        Ok(Self { dist })
    }

    /// Index of the next task to run.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.dist.sample(rng)
    }
}

/// Global iteration accounting shared by every VU.
///
/// `started` hands out iteration slots so the limit is never exceeded;
/// `completed` counts iterations whose requests all finished.
#[derive(Debug, Default)]
pub struct IterationCounter {
    started: AtomicU64,
    completed: AtomicU64,
}

impl IterationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a slot for a new iteration. Returns `false` once `max` slots
    /// have been handed out.
    fn try_start(&self, max: Option<u64>) -> bool {
        match max {
            Some(max) => self.started.fetch_add(1, Ordering::Relaxed) < max,
            None => true,
        }
    }

    /// Record a finished iteration, returning the new completed total.
    fn complete(&self) -> u64 {
        self.completed.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of fully completed task iterations.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }
}

/// Everything a VU shares with its siblings. Cheap to clone.
#[derive(Clone)]
pub struct VuContext {
    pub tasks: Arc<[TaskPlan]>,
    pub wait_time: WaitTime,
    pub client: ArztClient,
    pub sample_tx: mpsc::Sender<RequestSample>,
    pub iterations: Arc<IterationCounter>,
    pub max_iterations: Option<u64>,
    /// Test-wide token, cancelled when the iteration limit is reached.
    pub stop: CancellationToken,
    pub active_vus: ActiveVuCounter,
}

/// Why a VU left its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Cancelled,
    IterationLimit,
    ReceiverClosed,
}

/// Main virtual user task loop.
///
/// Each VU:
/// 1. Builds its own RNG, weighted task distribution, and [`Pacer`].
/// 2. Loops: claims an iteration slot, picks a task, issues its requests in
///    order (one [`RequestSample`] per request), then sleeps for the pacer's
///    wait.
/// 3. Stops when `cancel` fires, the iteration limit is exhausted, or the
///    metrics receiver has gone away.
///
/// The `active_vus` counter is incremented on entry and decremented on all
/// exit paths.
pub async fn vu_loop(vu_id: u32, ctx: VuContext, cancel: CancellationToken) {
    ctx.active_vus.increment();
    tracing::debug!(vu_id, "VU started");

    let exit = vu_loop_inner(&ctx, &cancel).await;

    tracing::debug!(vu_id, reason = ?exit, "VU stopped");
    ctx.active_vus.decrement();
}

async fn vu_loop_inner(ctx: &VuContext, cancel: &CancellationToken) -> Exit {
    let picker = match TaskPicker::new(&ctx.tasks) {
        Ok(picker) => picker,
        Err(e) => {
            tracing::error!("failed to build weighted task distribution: {e}");
            return Exit::Cancelled;
        },
    };
    let mut rng = rand::rngs::StdRng::from_rng(&mut rand::rng());
    let mut pacer = Pacer::new(ctx.wait_time.clone());

    loop {
        if cancel.is_cancelled() {
            return Exit::Cancelled;
        }
        if !ctx.iterations.try_start(ctx.max_iterations) {
            return Exit::IterationLimit;
        }

        let task = &ctx.tasks[picker.pick(&mut rng)];
        if let Some(exit) = run_task(ctx, task, cancel).await {
            return exit;
        }

        if Some(ctx.iterations.complete()) == ctx.max_iterations {
            tracing::info!("iteration limit reached, stopping test");
            ctx.stop.cancel();
            return Exit::IterationLimit;
        }

        let wait = pacer.next_wait(Instant::now(), &mut rng);
        if !wait.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(wait) => {},
                _ = cancel.cancelled() => return Exit::Cancelled,
            }
        }
    }
}

/// Issue every request of one task iteration. Returns `Some` if the VU must
/// stop before the iteration is complete.
async fn run_task(ctx: &VuContext, task: &TaskPlan, cancel: &CancellationToken) -> Option<Exit> {
    for request in &task.requests {
        let start = Instant::now();
        let result = tokio::select! {
            result = ctx.client.get(request) => result,
            _ = cancel.cancelled() => return Some(Exit::Cancelled),
        };
        let duration = start.elapsed();

        let sample = match result {
            Ok(_) => RequestSample::success(&task.name, &request.label, duration),
            Err(err) => {
                tracing::trace!(task = %task.name, endpoint = %request.label, "request failed: {err}");
                RequestSample::error(&task.name, &request.label, duration, err)
            },
        };

        if ctx.sample_tx.send(sample).await.is_err() {
            // Receiver dropped -- metrics aggregator is gone
            return Some(Exit::ReceiverClosed);
        }
    }
    None
}
