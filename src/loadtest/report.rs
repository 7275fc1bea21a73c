//! JSON report serialization for load test results.
//!
//! Produces a schema-versioned JSON report file containing latency
//! percentiles, throughput, error classification, per-task and per-endpoint
//! breakdowns, and the full resolved config for reproducibility.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::loadtest::config::{LoadTestConfig, Settings, Stage, Task};
use crate::loadtest::engine::LoadTestResult;

/// Schema version for the JSON report format.
///
/// Increment when making breaking changes to the report structure.
pub const SCHEMA_VERSION: &str = "1.0";

/// Top-level JSON report structure.
#[derive(Debug, Serialize)]
pub struct LoadTestReport {
    /// Report format version for parser compatibility.
    pub schema_version: String,
    /// RFC 3339 timestamp when the report was generated.
    pub timestamp: String,
    /// Target host that was tested.
    pub target_url: String,
    /// Actual test duration in seconds.
    pub duration_secs: f64,
    /// Completed task iterations.
    pub iterations: u64,
    /// Full resolved configuration (with CLI overrides applied).
    pub config: ReportConfig,
    /// Aggregate performance metrics.
    pub metrics: ReportMetrics,
    /// Error counts by classification type.
    pub errors: BTreeMap<String, u64>,
    /// Request and error counts keyed by task name.
    pub per_task: BTreeMap<String, TaskReportMetrics>,
    /// Per-endpoint metrics keyed by endpoint label.
    pub per_endpoint: BTreeMap<String, EndpointReportMetrics>,
}

/// Resolved test configuration embedded in the report.
#[derive(Debug, Serialize)]
pub struct ReportConfig {
    pub settings: Settings,
    pub tasks: Vec<Task>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<Stage>,
}

/// Aggregate performance metrics in the report.
#[derive(Debug, Serialize)]
pub struct ReportMetrics {
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// Error rate as a fraction (0.0..=1.0).
    pub error_rate: f64,
    /// HTTP errors with a 4xx status.
    pub http_4xx: u64,
    /// HTTP errors with a 5xx status.
    pub http_5xx: u64,
    /// Throughput in requests per second.
    pub throughput_rps: f64,
    /// Task iterations per second.
    pub iterations_per_sec: f64,
    pub latency: LatencyMetrics,
}

/// Latency percentile metrics in milliseconds.
#[derive(Debug, Serialize)]
pub struct LatencyMetrics {
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub error_p50_ms: u64,
    pub error_p95_ms: u64,
    pub error_p99_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct TaskReportMetrics {
    pub requests: u64,
    pub errors: u64,
}

/// Per-endpoint metrics for JSON report output.
#[derive(Debug, Serialize)]
pub struct EndpointReportMetrics {
    pub total_requests: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// Error rate as a fraction (0.0..=1.0).
    pub error_rate: f64,
    pub latency: EndpointLatencyMetrics,
    /// Error counts by classification for this endpoint.
    pub errors: BTreeMap<String, u64>,
}

/// Per-endpoint latency metrics in milliseconds.
#[derive(Debug, Serialize)]
pub struct EndpointLatencyMetrics {
    pub p50_ms: u64,
    pub p95_ms: u64,
    pub p99_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
    pub mean_ms: f64,
}

fn per_second(count: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs > 0.0 {
        count as f64 / elapsed_secs
    } else {
        0.0
    }
}

impl LoadTestReport {
    /// Build a report from load test results, config, and target host.
    pub fn from_result(result: &LoadTestResult, config: &LoadTestConfig, host: &str) -> Self {
        Self::from_result_at(result, config, host, Utc::now())
    }

    fn from_result_at(
        result: &LoadTestResult,
        config: &LoadTestConfig,
        host: &str,
        now: DateTime<Utc>,
    ) -> Self {
        let snap = &result.snapshot;
        let elapsed_secs = result.elapsed.as_secs_f64();

        let per_task = snap
            .per_task
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    TaskReportMetrics {
                        requests: t.requests,
                        errors: t.errors,
                    },
                )
            })
            .collect();

        let per_endpoint = snap
            .per_endpoint
            .iter()
            .map(|e| {
                (
                    e.label.clone(),
                    EndpointReportMetrics {
                        total_requests: e.total_requests,
                        success_count: e.success_count,
                        error_count: e.error_count,
                        error_rate: e.error_rate,
                        latency: EndpointLatencyMetrics {
                            p50_ms: e.p50,
                            p95_ms: e.p95,
                            p99_ms: e.p99,
                            min_ms: e.min,
                            max_ms: e.max,
                            mean_ms: e.mean,
                        },
                        errors: e.error_categories.clone().into_iter().collect(),
                    },
                )
            })
            .collect();

        let mut settings = config.settings.clone();
        settings.host = Some(host.to_string());

        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            timestamp: now.to_rfc3339(),
            target_url: host.to_string(),
            duration_secs: elapsed_secs,
            iterations: result.iterations,
            config: ReportConfig {
                settings,
                tasks: config.task.clone(),
                stages: config.stage.clone(),
            },
            metrics: ReportMetrics {
                total_requests: snap.total_requests,
                success_count: snap.success_count,
                error_count: snap.error_count,
                error_rate: snap.error_rate,
                http_4xx: snap.http_4xx,
                http_5xx: snap.http_5xx,
                throughput_rps: per_second(snap.total_requests, elapsed_secs),
                iterations_per_sec: per_second(result.iterations, elapsed_secs),
                latency: LatencyMetrics {
                    p50_ms: snap.p50,
                    p95_ms: snap.p95,
                    p99_ms: snap.p99,
                    error_p50_ms: snap.error_p50,
                    error_p95_ms: snap.error_p95,
                    error_p99_ms: snap.error_p99,
                },
            },
            errors: snap.error_category_counts.clone().into_iter().collect(),
            per_task,
            per_endpoint,
        }
    }
}

/// Write a JSON report file into `reports_dir`.
///
/// Creates the directory if it does not exist. The filename is
/// timestamped, see [`report_filename`].
///
/// Returns the path to the written report file.
pub fn write_report(report: &LoadTestReport, reports_dir: &Path) -> Result<PathBuf, std::io::Error> {
    std::fs::create_dir_all(reports_dir)?;

    let report_path = reports_dir.join(report_filename(&Utc::now()));
    let json = serde_json::to_string_pretty(report).map_err(std::io::Error::other)?;
    std::fs::write(&report_path, json)?;

    tracing::info!(path = %report_path.display(), "wrote load test report");
    Ok(report_path)
}

/// Report filename for a given timestamp: `loadtest-YYYY-MM-DDTHH-MM-SS.json`.
///
/// Uses hyphens instead of colons for cross-platform filename compatibility.
pub fn report_filename(timestamp: &DateTime<Utc>) -> String {
    format!("loadtest-{}.json", timestamp.format("%Y-%m-%dT%H-%M-%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loadtest::metrics::{EndpointSnapshot, MetricsSnapshot, TaskCounts};
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::time::Duration;

    fn test_result() -> LoadTestResult {
        LoadTestResult {
            snapshot: MetricsSnapshot {
                p50: 20,
                p95: 80,
                p99: 150,
                error_p50: 3,
                error_p95: 4,
                error_p99: 5,
                success_count: 90,
                error_count: 10,
                total_requests: 100,
                error_rate: 0.1,
                per_task: vec![TaskCounts {
                    name: "get_name".to_string(),
                    requests: 100,
                    errors: 10,
                }],
                error_category_counts: HashMap::from([("http".to_string(), 10)]),
                http_4xx: 10,
                http_5xx: 0,
                per_endpoint: vec![EndpointSnapshot {
                    label: "/rest?name=X".to_string(),
                    p50: 20,
                    p95: 80,
                    p99: 150,
                    min: 2,
                    max: 160,
                    mean: 25.0,
                    total_requests: 100,
                    success_count: 90,
                    error_count: 10,
                    error_rate: 0.1,
                    error_categories: HashMap::from([("http".to_string(), 10)]),
                }],
            },
            elapsed: Duration::from_secs(10),
            iterations: 20,
            final_active_vus: 0,
        }
    }

    fn report() -> LoadTestReport {
        let config = LoadTestConfig::arzt_default().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        LoadTestReport::from_result_at(&test_result(), &config, "https://arzt.test:3000", now)
    }

    #[test]
    fn test_report_json_structure() {
        let json = serde_json::to_value(report()).unwrap();

        assert_eq!(json["schema_version"], SCHEMA_VERSION);
        assert_eq!(json["timestamp"], "2024-03-01T12:30:05+00:00");
        assert_eq!(json["target_url"], "https://arzt.test:3000");
        assert_eq!(json["iterations"], 20);
        assert_eq!(json["metrics"]["total_requests"], 100);
        assert_eq!(json["metrics"]["throughput_rps"], 10.0);
        assert_eq!(json["metrics"]["iterations_per_sec"], 2.0);
        assert_eq!(json["metrics"]["latency"]["p95_ms"], 80);
        assert_eq!(json["errors"]["http"], 10);
        assert_eq!(json["metrics"]["http_4xx"], 10);
        assert_eq!(json["metrics"]["http_5xx"], 0);
        assert_eq!(json["per_task"]["get_name"]["errors"], 10);
        assert_eq!(json["per_endpoint"]["/rest?name=X"]["latency"]["max_ms"], 160);
    }

    #[test]
    fn test_report_embeds_resolved_config() {
        let json = serde_json::to_value(report()).unwrap();
        let config = &json["config"];

        assert_eq!(config["settings"]["host"], "https://arzt.test:3000");
        assert_eq!(config["settings"]["virtual_users"], 500);
        assert_eq!(config["settings"]["wait_time"]["type"], "constant_throughput");
        assert_eq!(config["tasks"].as_array().unwrap().len(), 3);
        assert_eq!(config["tasks"][0]["type"], "path");
        assert_eq!(config["tasks"][0]["values"][1], 20);
        assert!(config.get("stages").is_none(), "empty stages are omitted");
    }

    #[test]
    fn test_report_filename_format() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 9, 5, 7).unwrap();
        assert_eq!(report_filename(&ts), "loadtest-2024-03-01T09-05-07.json");
    }

    #[test]
    fn test_write_report_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let reports_dir = dir.path().join("reports").join("nested");

        let path = write_report(&report(), &reports_dir).unwrap();

        assert!(path.starts_with(&reports_dir));
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("loadtest-") && name.ends_with(".json"), "{name}");

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed["metrics"]["error_count"], 10);
    }
}
