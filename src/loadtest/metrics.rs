//! HdrHistogram-based metrics pipeline.
//!
//! Provides [`MetricsRecorder`] for recording GET request latency samples into
//! separate success/error HdrHistogram buckets, with per-task counters and
//! per-endpoint histograms.
//!
//! # Design
//!
//! - **Single-owner**: No `Arc<Mutex>`. The engine's aggregator task owns the
//!   recorder and is fed by an mpsc channel from every virtual user.
//! - **Separate buckets**: Success and error latencies are tracked in independent
//!   histograms so error spikes don't pollute success percentiles.
//! - **Optional coordinated omission correction**: When an expected interval is
//!   configured, samples are recorded with `record_correct()`, which fills in
//!   synthetic samples for intervals missed while the target was stalled.
//!   Request counts are always the logical count, never the synthetic one.
//! - **Millisecond resolution**: Matches how users think about latency.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use hdrhistogram::Histogram;

use crate::loadtest::error::RequestError;

/// A single request measurement sample.
///
/// Created via [`RequestSample::success`] or [`RequestSample::error`].
#[derive(Debug, Clone)]
pub struct RequestSample {
    /// Name of the task that issued the request.
    pub task: String,
    /// Endpoint label the request is grouped under.
    pub endpoint: String,
    /// Wall-clock duration of the request.
    pub duration: Duration,
    /// `Ok(())` for success, `Err(RequestError)` for failure.
    pub result: Result<(), RequestError>,
    /// When the sample was taken.
    pub timestamp: Instant,
}

impl RequestSample {
    /// Create a success sample with the current timestamp.
    pub fn success(task: impl Into<String>, endpoint: impl Into<String>, duration: Duration) -> Self {
        Self {
            task: task.into(),
            endpoint: endpoint.into(),
            duration,
            result: Ok(()),
            timestamp: Instant::now(),
        }
    }

    /// Create an error sample with the current timestamp.
    pub fn error(
        task: impl Into<String>,
        endpoint: impl Into<String>,
        duration: Duration,
        err: RequestError,
    ) -> Self {
        Self {
            task: task.into(),
            endpoint: endpoint.into(),
            duration,
            result: Err(err),
            timestamp: Instant::now(),
        }
    }
}

/// Request and error counts for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCounts {
    pub name: String,
    pub requests: u64,
    pub errors: u64,
}

/// Per-endpoint metrics snapshot with latency percentiles and error breakdown.
///
/// Sorted by label in [`MetricsSnapshot::per_endpoint`] for deterministic
/// terminal and JSON output.
#[derive(Debug, Clone)]
pub struct EndpointSnapshot {
    /// Endpoint label, e.g. `/rest/20` or `/rest?name=X`.
    pub label: String,
    /// Success latency P50 (milliseconds).
    pub p50: u64,
    /// Success latency P95 (milliseconds).
    pub p95: u64,
    /// Success latency P99 (milliseconds).
    pub p99: u64,
    /// Minimum latency across all requests (milliseconds).
    pub min: u64,
    /// Maximum latency across all requests (milliseconds).
    pub max: u64,
    /// Mean latency across all requests (milliseconds).
    pub mean: f64,
    /// Total requests for this endpoint (success + error).
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// Error rate as a fraction (0.0..=1.0).
    pub error_rate: f64,
    /// Error counts by classification for this endpoint.
    pub error_categories: HashMap<String, u64>,
}

/// Point-in-time snapshot of all metrics state.
///
/// Captured via [`MetricsRecorder::snapshot`]. All percentile values are in
/// milliseconds.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Success latency P50 (milliseconds).
    pub p50: u64,
    /// Success latency P95 (milliseconds).
    pub p95: u64,
    /// Success latency P99 (milliseconds).
    pub p99: u64,
    /// Error latency P50 (milliseconds).
    pub error_p50: u64,
    /// Error latency P95 (milliseconds).
    pub error_p95: u64,
    /// Error latency P99 (milliseconds).
    pub error_p99: u64,
    /// Total successful requests recorded.
    pub success_count: u64,
    /// Total failed requests recorded.
    pub error_count: u64,
    /// Total requests (success + error).
    pub total_requests: u64,
    /// Fraction of requests that were errors (0.0..=1.0).
    pub error_rate: f64,
    /// Per-task counts, sorted by task name.
    pub per_task: Vec<TaskCounts>,
    /// Error counts by classification (http, timeout, connection, url).
    pub error_category_counts: HashMap<String, u64>,
    /// HTTP errors with a 4xx status.
    pub http_4xx: u64,
    /// HTTP errors with a 5xx status.
    pub http_5xx: u64,
    /// Per-endpoint metrics, sorted by label.
    pub per_endpoint: Vec<EndpointSnapshot>,
}

fn new_histogram() -> Histogram<u64> {
    let mut histogram = Histogram::<u64>::new(3).expect("3 sigfigs is always valid");
    histogram.auto(true);
    histogram
}

fn quantile(histogram: &Histogram<u64>, q: f64) -> u64 {
    if histogram.is_empty() {
        0
    } else {
        histogram.value_at_quantile(q)
    }
}

fn rate(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Success/error histogram pair plus logical counters.
struct LatencyPair {
    success_histogram: Histogram<u64>,
    error_histogram: Histogram<u64>,
    total_success: u64,
    total_errors: u64,
    error_category_counts: HashMap<String, u64>,
}

impl LatencyPair {
    fn new() -> Self {
        Self {
            success_histogram: new_histogram(),
            error_histogram: new_histogram(),
            total_success: 0,
            total_errors: 0,
            error_category_counts: HashMap::new(),
        }
    }

    fn record(&mut self, ms: u64, result: &Result<(), RequestError>, expected_interval_ms: Option<u64>) {
        let histogram = match result {
            Ok(()) => {
                self.total_success += 1;
                &mut self.success_histogram
            },
            Err(err) => {
                self.total_errors += 1;
                *self
                    .error_category_counts
                    .entry(err.error_category().to_owned())
                    .or_insert(0) += 1;
                &mut self.error_histogram
            },
        };
        let _ = match expected_interval_ms {
            Some(interval) => histogram.record_correct(ms, interval),
            None => histogram.record(ms),
        };
    }

    fn total(&self) -> u64 {
        self.total_success + self.total_errors
    }

    /// Min, max and mean across both histograms.
    fn combined_stats(&self) -> (u64, u64, f64) {
        let s = &self.success_histogram;
        let e = &self.error_histogram;
        match (s.is_empty(), e.is_empty()) {
            (false, false) => {
                let (sn, en) = (s.len() as f64, e.len() as f64);
                (
                    s.min().min(e.min()),
                    s.max().max(e.max()),
                    (s.mean() * sn + e.mean() * en) / (sn + en),
                )
            },
            (false, true) => (s.min(), s.max(), s.mean()),
            (true, false) => (e.min(), e.max(), e.mean()),
            (true, true) => (0, 0, 0.0),
        }
    }
}

/// HdrHistogram-backed metrics recorder.
///
/// Designed for single-owner usage, with no internal locking.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use arzt_loadtest::loadtest::metrics::{MetricsRecorder, RequestSample};
///
/// let mut recorder = MetricsRecorder::new(None);
/// recorder.record(&RequestSample::success("get_id", "/rest/1", Duration::from_millis(42)));
///
/// assert_eq!(recorder.success_count(), 1);
/// assert_eq!(recorder.p50(), 42);
/// ```
pub struct MetricsRecorder {
    overall: LatencyPair,
    /// Expected interval between requests in milliseconds. When set,
    /// `record_correct()` is used for coordinated omission correction.
    expected_interval_ms: Option<u64>,
    /// Per-task (requests, errors).
    per_task: HashMap<String, (u64, u64)>,
    per_endpoint: HashMap<String, LatencyPair>,
    http_4xx: u64,
    http_5xx: u64,
}

impl MetricsRecorder {
    /// Create a new recorder.
    ///
    /// Histograms are created with 3 significant figures of precision and
    /// auto-resize enabled.
    pub fn new(expected_interval_ms: Option<u64>) -> Self {
        Self {
            overall: LatencyPair::new(),
            expected_interval_ms,
            per_task: HashMap::new(),
            per_endpoint: HashMap::new(),
            http_4xx: 0,
            http_5xx: 0,
        }
    }

    /// Record a request sample.
    ///
    /// The sample is routed to the success or error histogram based on its
    /// `result` field, and into its task and endpoint breakdowns.
    pub fn record(&mut self, sample: &RequestSample) {
        let ms = u64::try_from(sample.duration.as_millis()).unwrap_or(u64::MAX);

        self.overall
            .record(ms, &sample.result, self.expected_interval_ms);

        let task = self.per_task.entry(sample.task.clone()).or_insert((0, 0));
        task.0 += 1;
        if let Err(err) = &sample.result {
            task.1 += 1;
            if err.is_client_error() {
                self.http_4xx += 1;
            } else if err.is_server_error() {
                self.http_5xx += 1;
            }
        }

        self.per_endpoint
            .entry(sample.endpoint.clone())
            .or_insert_with(LatencyPair::new)
            .record(ms, &sample.result, self.expected_interval_ms);
    }

    /// Success latency P50 in milliseconds. Returns 0 if no samples recorded.
    pub fn p50(&self) -> u64 {
        quantile(&self.overall.success_histogram, 0.50)
    }

    /// Success latency P95 in milliseconds. Returns 0 if no samples recorded.
    pub fn p95(&self) -> u64 {
        quantile(&self.overall.success_histogram, 0.95)
    }

    /// Success latency P99 in milliseconds. Returns 0 if no samples recorded.
    pub fn p99(&self) -> u64 {
        quantile(&self.overall.success_histogram, 0.99)
    }

    /// Number of successful requests (logical count).
    pub fn success_count(&self) -> u64 {
        self.overall.total_success
    }

    /// Number of failed requests (logical count).
    pub fn error_count(&self) -> u64 {
        self.overall.total_errors
    }

    pub fn total_requests(&self) -> u64 {
        self.overall.total()
    }

    /// Error rate as a fraction (0.0..=1.0). Returns 0.0 if no requests recorded.
    pub fn error_rate(&self) -> f64 {
        rate(self.overall.total_errors, self.overall.total())
    }

    /// Total requests issued by the named task.
    pub fn task_count(&self, task: &str) -> u64 {
        self.per_task.get(task).map_or(0, |(requests, _)| *requests)
    }

    /// Capture a point-in-time snapshot of all metrics.
    ///
    /// Per-task and per-endpoint entries are sorted by name.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut per_endpoint: Vec<EndpointSnapshot> = self
            .per_endpoint
            .iter()
            .map(|(label, pair)| {
                let (min, max, mean) = pair.combined_stats();
                EndpointSnapshot {
                    label: label.clone(),
                    p50: quantile(&pair.success_histogram, 0.50),
                    p95: quantile(&pair.success_histogram, 0.95),
                    p99: quantile(&pair.success_histogram, 0.99),
                    min,
                    max,
                    mean,
                    total_requests: pair.total(),
                    success_count: pair.total_success,
                    error_count: pair.total_errors,
                    error_rate: rate(pair.total_errors, pair.total()),
                    error_categories: pair.error_category_counts.clone(),
                }
            })
            .collect();
        per_endpoint.sort_by(|a, b| a.label.cmp(&b.label));

        let mut per_task: Vec<TaskCounts> = self
            .per_task
            .iter()
            .map(|(name, (requests, errors))| TaskCounts {
                name: name.clone(),
                requests: *requests,
                errors: *errors,
            })
            .collect();
        per_task.sort_by(|a, b| a.name.cmp(&b.name));

        MetricsSnapshot {
            p50: self.p50(),
            p95: self.p95(),
            p99: self.p99(),
            error_p50: quantile(&self.overall.error_histogram, 0.50),
            error_p95: quantile(&self.overall.error_histogram, 0.95),
            error_p99: quantile(&self.overall.error_histogram, 0.99),
            success_count: self.success_count(),
            error_count: self.error_count(),
            total_requests: self.total_requests(),
            error_rate: self.error_rate(),
            per_task,
            error_category_counts: self.overall.error_category_counts.clone(),
            http_4xx: self.http_4xx,
            http_5xx: self.http_5xx,
            per_endpoint,
        }
    }
}
