//! TOML-based load test scenario configuration.
//!
//! Defines typed structs for parsing load test scenarios from TOML files:
//! general settings, a weighted list of GET tasks, and optional load-shaping
//! stages.
//!
//! Three task types are supported, each expanding to an ordered list of
//! GET requests executed back-to-back within one task iteration:
//!
//! - `get`: a fixed list of paths.
//! - `path`: one request per value, substituted into a `{value}` placeholder.
//! - `query`: one request per value, sent as `?param=value`.
//!
//! # Example TOML
//!
//! ```toml
//! [settings]
//! virtual_users = 10
//! duration_secs = 60
//! wait_time = { type = "constant_throughput", per_second = 0.1 }
//!
//! [[task]]
//! type = "path"
//! name = "get_id"
//! weight = 100
//! path = "/rest/{value}"
//! values = [1, 20, 30]
//!
//! [[task]]
//! type = "query"
//! name = "get_name"
//! weight = 150
//! path = "/rest"
//! param = "name"
//! values = ["Bernd Brot", "X"]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::loadtest::error::LoadTestError;

/// The built-in Arzt scenario, also written out by `arzt-loadtest init`.
pub const ARZT_SCENARIO: &str = include_str!("../../scenarios/arzt.toml");

/// Host used when neither the CLI nor the config names one.
pub const DEFAULT_HOST: &str = "https://localhost:3000";

/// Placeholder substituted by `path` tasks.
pub const VALUE_PLACEHOLDER: &str = "{value}";

fn default_timeout_ms() -> u64 {
    5000
}

/// A load-shaping stage defining a target VU count and duration.
///
/// The engine linearly ramps VU count to `target_vus` over the stage's
/// `duration_secs`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Stage {
    /// Target number of virtual users at the end of this stage.
    pub target_vus: u32,
    /// Duration of this stage in seconds.
    pub duration_secs: u64,
}

/// Top-level load test configuration parsed from a TOML file.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoadTestConfig {
    /// General load test settings.
    pub settings: Settings,
    /// Weighted tasks defining simulated user behavior.
    ///
    /// Named `task` because TOML `[[task]]` array-of-tables syntax creates
    /// a key called `task`.
    pub task: Vec<Task>,
    /// Optional load-shaping stages. When absent, flat load is applied
    /// with `settings.virtual_users`.
    #[serde(default)]
    pub stage: Vec<Stage>,
}

/// General load test settings controlling execution parameters.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Base URL of the target server. The `--host` flag takes precedence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Number of concurrent virtual users to simulate.
    pub virtual_users: u32,
    /// Total test duration in seconds.
    pub duration_secs: u64,
    /// Per-request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Accept invalid or self-signed TLS certificates.
    #[serde(default)]
    pub insecure: bool,
    /// Expected interval between consecutive requests from a single VU (ms).
    ///
    /// When set, latencies are recorded with HdrHistogram's
    /// `record_correct()` for coordinated omission correction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_interval_ms: Option<u64>,
    /// Delay strategy applied after every task iteration.
    #[serde(default)]
    pub wait_time: WaitTime,
}

/// Delay a virtual user inserts between task iterations.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WaitTime {
    /// Always wait the same number of seconds.
    Constant { seconds: f64 },
    /// Wait a uniformly random number of seconds in `[min_secs, max_secs]`.
    Between { min_secs: f64, max_secs: f64 },
    /// Start iterations at most once every `seconds`.
    ConstantPacing { seconds: f64 },
    /// Run at most `per_second` iterations per second.
    ConstantThroughput { per_second: f64 },
}

impl Default for WaitTime {
    fn default() -> Self {
        Self::Constant { seconds: 0.0 }
    }
}

impl fmt::Display for WaitTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant { seconds } => write!(f, "constant({seconds}s)"),
            Self::Between { min_secs, max_secs } => {
                write!(f, "between({min_secs}s, {max_secs}s)")
            },
            Self::ConstantPacing { seconds } => write!(f, "constant_pacing({seconds}s)"),
            Self::ConstantThroughput { per_second } => {
                write!(f, "constant_throughput({per_second}/s)")
            },
        }
    }
}

impl WaitTime {
    fn validate(&self) -> Result<(), String> {
        let finite_non_negative = |v: f64| v.is_finite() && v >= 0.0;
        match *self {
            Self::Constant { seconds } if !finite_non_negative(seconds) => {
                Err(format!("constant wait must be >= 0 seconds, got {seconds}"))
            },
            Self::Between { min_secs, max_secs }
                if !finite_non_negative(min_secs) || !finite_non_negative(max_secs) =>
            {
                Err(format!(
                    "between wait bounds must be >= 0 seconds, got {min_secs}..{max_secs}"
                ))
            },
            Self::Between { min_secs, max_secs } if min_secs > max_secs => Err(format!(
                "between wait has min_secs={min_secs} greater than max_secs={max_secs}"
            )),
            Self::ConstantPacing { seconds } if !(seconds.is_finite() && seconds > 0.0) => {
                Err(format!("constant_pacing needs a positive interval, got {seconds}"))
            },
            Self::ConstantThroughput { per_second }
                if !(per_second.is_finite() && per_second > 0.0) =>
            {
                Err(format!(
                    "constant_throughput needs a positive rate, got {per_second}"
                ))
            },
            _ => Ok(()),
        }
    }

    /// The pacing interval for `constant_pacing` and `constant_throughput`.
    pub fn pacing_interval(&self) -> Option<Duration> {
        match *self {
            Self::ConstantPacing { seconds } => Some(Duration::from_secs_f64(seconds)),
            Self::ConstantThroughput { per_second } => {
                Some(Duration::from_secs_f64(1.0 / per_second))
            },
            _ => None,
        }
    }
}

/// A value substituted into a path or sent as a query parameter.
///
/// Accepts both TOML integers (`values = [1, 20]`) and strings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// A weighted unit of simulated user behavior.
///
/// The `type` field in TOML determines the variant. Every variant carries a
/// unique `name`, a scheduling `weight`, and optional extra `headers`.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// GET each listed path in order.
    Get {
        name: String,
        weight: u32,
        paths: Vec<String>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    /// GET `path` once per value, replacing `{value}`.
    Path {
        name: String,
        weight: u32,
        path: String,
        values: Vec<ParamValue>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
    /// GET `path?param=value` once per value.
    Query {
        name: String,
        weight: u32,
        path: String,
        param: String,
        values: Vec<ParamValue>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
}

/// A single GET request produced by expanding a [`Task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    /// Name under which statistics for this request are grouped.
    pub label: String,
    /// Path appended to the host, without query string.
    pub path: String,
    /// Query pairs, form-urlencoded on the wire.
    pub query: Vec<(String, String)>,
    /// Extra request headers.
    pub headers: Vec<(String, String)>,
}

impl Task {
    /// Returns the task name.
    pub fn name(&self) -> &str {
        match self {
            Self::Get { name, .. } | Self::Path { name, .. } | Self::Query { name, .. } => name,
        }
    }

    /// Returns the scheduling weight of this task, regardless of variant.
    pub fn weight(&self) -> u32 {
        match self {
            Self::Get { weight, .. } | Self::Path { weight, .. } | Self::Query { weight, .. } => {
                *weight
            },
        }
    }

    /// Number of GET requests one iteration of this task issues.
    pub fn request_count(&self) -> usize {
        match self {
            Self::Get { paths, .. } => paths.len(),
            Self::Path { values, .. } | Self::Query { values, .. } => values.len(),
        }
    }

    fn headers(&self) -> &BTreeMap<String, String> {
        match self {
            Self::Get { headers, .. } | Self::Path { headers, .. } | Self::Query { headers, .. } => {
                headers
            },
        }
    }

    /// Expand the task into the ordered requests of one iteration.
    pub fn requests(&self) -> Vec<RequestSpec> {
        let headers: Vec<(String, String)> = self
            .headers()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        match self {
            Self::Get { paths, .. } => paths
                .iter()
                .map(|p| RequestSpec {
                    label: p.clone(),
                    path: p.clone(),
                    query: Vec::new(),
                    headers: headers.clone(),
                })
                .collect(),
            Self::Path { path, values, .. } => values
                .iter()
                .map(|v| {
                    let value = v.to_string();
                    RequestSpec {
                        label: path.replace(VALUE_PLACEHOLDER, &value),
                        path: path.replace(VALUE_PLACEHOLDER, &encode_path_segment(&value)),
                        query: Vec::new(),
                        headers: headers.clone(),
                    }
                })
                .collect(),
            Self::Query {
                path,
                param,
                values,
                ..
            } => values
                .iter()
                .map(|v| {
                    let value = v.to_string();
                    RequestSpec {
                        label: format!("{path}?{param}={value}"),
                        path: path.clone(),
                        query: vec![(param.clone(), value)],
                        headers: headers.clone(),
                    }
                })
                .collect(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        let name = self.name();
        if name.trim().is_empty() {
            return Err("Every [[task]] needs a non-empty name".to_string());
        }
        if self.request_count() == 0 {
            return Err(format!("Task '{name}' issues no requests (empty paths/values)"));
        }
        match self {
            Self::Get { paths, .. } => {
                if let Some(p) = paths.iter().find(|p| !p.starts_with('/')) {
                    return Err(format!("Task '{name}': path '{p}' must start with '/'"));
                }
            },
            Self::Path { path, values, .. } => {
                if !path.starts_with('/') {
                    return Err(format!("Task '{name}': path '{path}' must start with '/'"));
                }
                if !path.contains(VALUE_PLACEHOLDER) {
                    return Err(format!(
                        "Task '{name}': path '{path}' has no {VALUE_PLACEHOLDER} placeholder"
                    ));
                }
                let unusable = |s: &str| matches!(s, "" | "." | "..");
                if let Some(v) = values.iter().find(|v| unusable(&v.to_string())) {
                    return Err(format!(
                        "Task '{name}': path value '{v}' is not a usable path segment"
                    ));
                }
            },
            Self::Query { path, param, .. } => {
                if !path.starts_with('/') {
                    return Err(format!("Task '{name}': path '{path}' must start with '/'"));
                }
                if param.is_empty() {
                    return Err(format!("Task '{name}': query param name is empty"));
                }
            },
        }
        Ok(())
    }
}

/// Percent-encode `value` for use as a single path segment.
///
/// Everything except ASCII alphanumerics and `*-._` is escaped, including
/// `/`, `?`, `#` and `%`. Space becomes `%20`, not the form-encoded `+`.
fn encode_path_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Parse `host` and check that it is an absolute `http`/`https` URL.
pub fn parse_host(host: &str) -> Result<url::Url, LoadTestError> {
    let url = url::Url::parse(host)
        .map_err(|e| LoadTestError::validation(format!("Invalid host '{host}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LoadTestError::validation(format!(
            "Host '{host}' must use http or https, not '{other}'"
        ))),
    }
}

impl LoadTestConfig {
    /// Parse a TOML string into a validated [`LoadTestConfig`].
    pub fn from_toml(content: &str) -> Result<Self, LoadTestError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a [`LoadTestConfig`] from a file path.
    ///
    /// Returns [`LoadTestError::ConfigIo`] if the file cannot be read,
    /// [`LoadTestError::ConfigParse`] if the TOML is malformed, or
    /// [`LoadTestError::ConfigValidation`] if validation fails.
    pub fn load(path: &Path) -> Result<Self, LoadTestError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadTestError::ConfigIo {
            source,
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// The built-in Arzt scenario.
    pub fn arzt_default() -> Result<Self, LoadTestError> {
        Self::from_toml(ARZT_SCENARIO)
    }

    /// Returns `true` if the config defines load-shaping stages.
    pub fn has_stages(&self) -> bool {
        !self.stage.is_empty()
    }

    /// Returns the sum of all stage durations in seconds (0 if no stages).
    pub fn total_stage_duration(&self) -> u64 {
        self.stage.iter().map(|s| s.duration_secs).sum()
    }

    /// Returns the effective test duration in seconds.
    pub fn effective_duration_secs(&self) -> u64 {
        if self.has_stages() {
            self.total_stage_duration()
        } else {
            self.settings.duration_secs
        }
    }

    /// Sum of all task weights.
    pub fn total_weight(&self) -> u64 {
        self.task.iter().map(|t| u64::from(t.weight())).sum()
    }

    /// Validate that the config is semantically correct.
    pub fn validate(&self) -> Result<(), LoadTestError> {
        if self.task.is_empty() {
            return Err(LoadTestError::validation(
                "Config must contain at least one [[task]]",
            ));
        }

        if self.total_weight() == 0 {
            return Err(LoadTestError::validation(
                "Total task weights must be greater than 0",
            ));
        }

        let mut seen = HashSet::new();
        for task in &self.task {
            task.validate().map_err(LoadTestError::validation)?;
            if !seen.insert(task.name()) {
                return Err(LoadTestError::validation(format!(
                    "Duplicate task name '{}'",
                    task.name()
                )));
            }
        }

        self.settings
            .wait_time
            .validate()
            .map_err(LoadTestError::validation)?;

        if let Some(ref host) = self.settings.host {
            parse_host(host)?;
        }

        if self.has_stages() {
            for (i, stage) in self.stage.iter().enumerate() {
                if stage.duration_secs == 0 {
                    return Err(LoadTestError::validation(format!(
                        "Stage {} has duration_secs=0; each stage must have a positive duration",
                        i + 1
                    )));
                }
            }
        } else if self.settings.virtual_users == 0 {
            return Err(LoadTestError::validation(
                "settings.virtual_users must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl Settings {
    /// Convert the `timeout_ms` field to a [`Duration`].
    pub fn timeout_as_duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings() -> Settings {
        Settings {
            host: None,
            virtual_users: 10,
            duration_secs: 60,
            timeout_ms: 5000,
            insecure: false,
            expected_interval_ms: None,
            wait_time: WaitTime::default(),
        }
    }

    fn get_task(name: &str, weight: u32) -> Task {
        Task::Get {
            name: name.to_string(),
            weight,
            paths: vec!["/rest".to_string()],
            headers: BTreeMap::new(),
        }
    }

    fn config_with(tasks: Vec<Task>) -> LoadTestConfig {
        LoadTestConfig {
            settings: settings(),
            task: tasks,
            stage: vec![],
        }
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml_str = r#"
[settings]
virtual_users = 10
duration_secs = 60

[[task]]
type = "get"
name = "all"
weight = 1
paths = ["/rest"]
"#;
        let config = LoadTestConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.settings.virtual_users, 10);
        assert_eq!(config.settings.timeout_ms, 5000);
        assert!(!config.settings.insecure);
        assert_eq!(config.settings.expected_interval_ms, None);
        assert_eq!(config.settings.wait_time, WaitTime::Constant { seconds: 0.0 });
        assert_eq!(config.task.len(), 1);
        assert_eq!(config.task[0].name(), "all");
    }

    #[test]
    fn test_arzt_default_matches_reference_script() {
        let config = LoadTestConfig::arzt_default().unwrap();
        assert_eq!(config.settings.virtual_users, 500);
        assert!(config.settings.insecure);
        assert_eq!(
            config.settings.wait_time,
            WaitTime::ConstantThroughput { per_second: 0.1 }
        );
        assert_eq!(config.settings.host.as_deref(), Some(DEFAULT_HOST));

        let summary: Vec<(&str, u32, usize)> = config
            .task
            .iter()
            .map(|t| (t.name(), t.weight(), t.request_count()))
            .collect();
        assert_eq!(
            summary,
            vec![("get_id", 100, 6), ("get_praxis", 200, 5), ("get_name", 150, 6)]
        );
    }

    #[test]
    fn test_path_task_expands_integer_values() {
        let config = LoadTestConfig::arzt_default().unwrap();
        let labels: Vec<String> = config.task[0]
            .requests()
            .into_iter()
            .map(|r| r.path)
            .collect();
        assert_eq!(
            labels,
            vec!["/rest/1", "/rest/20", "/rest/30", "/rest/40", "/rest/50", "/rest/60"]
        );
    }

    #[test]
    fn test_query_task_expands_to_query_pairs() {
        let config = LoadTestConfig::arzt_default().unwrap();
        let requests = config.task[1].requests();
        assert_eq!(requests.len(), 5);
        assert_eq!(requests[0].path, "/rest");
        assert_eq!(
            requests[0].query,
            vec![("praxis".to_string(), "Dr. Bernd".to_string())]
        );
        assert_eq!(requests[0].label, "/rest?praxis=Dr. Bernd");
    }

    #[test]
    fn test_task_headers_are_carried_into_requests() {
        let toml_str = r#"
[settings]
virtual_users = 1
duration_secs = 1

[[task]]
type = "get"
name = "conditional"
weight = 1
paths = ["/rest/1"]
headers = { "If-None-Match" = "\"0\"" }
"#;
        let config = LoadTestConfig::from_toml(toml_str).unwrap();
        let requests = config.task[0].requests();
        assert_eq!(
            requests[0].headers,
            vec![("If-None-Match".to_string(), "\"0\"".to_string())]
        );
    }

    #[test]
    fn test_parse_wait_time_variants() {
        for (snippet, expected) in [
            (
                r#"{ type = "constant", seconds = 1.5 }"#,
                WaitTime::Constant { seconds: 1.5 },
            ),
            (
                r#"{ type = "between", min_secs = 1.0, max_secs = 3.0 }"#,
                WaitTime::Between {
                    min_secs: 1.0,
                    max_secs: 3.0,
                },
            ),
            (
                r#"{ type = "constant_pacing", seconds = 10.0 }"#,
                WaitTime::ConstantPacing { seconds: 10.0 },
            ),
            (
                r#"{ type = "constant_throughput", per_second = 0.5 }"#,
                WaitTime::ConstantThroughput { per_second: 0.5 },
            ),
        ] {
            let toml_str = format!(
                "[settings]\nvirtual_users = 1\nduration_secs = 1\nwait_time = {snippet}\n\n\
                 [[task]]\ntype = \"get\"\nname = \"t\"\nweight = 1\npaths = [\"/\"]\n"
            );
            let config = LoadTestConfig::from_toml(&toml_str).unwrap();
            assert_eq!(config.settings.wait_time, expected);
        }
    }

    #[test]
    fn test_pacing_interval() {
        assert_eq!(
            WaitTime::ConstantThroughput { per_second: 0.1 }.pacing_interval(),
            Some(Duration::from_secs(10))
        );
        assert_eq!(
            WaitTime::ConstantPacing { seconds: 2.0 }.pacing_interval(),
            Some(Duration::from_secs(2))
        );
        assert_eq!(WaitTime::default().pacing_interval(), None);
    }

    #[test]
    fn test_validate_empty_tasks_fails() {
        let result = config_with(vec![]).validate();
        assert!(matches!(
            result.unwrap_err(),
            LoadTestError::ConfigValidation { .. }
        ));
    }

    #[test]
    fn test_validate_zero_total_weight_fails() {
        let result = config_with(vec![get_task("a", 0), get_task("b", 0)]).validate();
        let err = result.unwrap_err().to_string();
        assert!(err.contains("weights"), "unexpected error: {err}");
    }

    #[test]
    fn test_validate_zero_weight_task_allowed_when_total_positive() {
        assert!(config_with(vec![get_task("a", 0), get_task("b", 1)])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_validate_duplicate_names_fails() {
        let err = config_with(vec![get_task("a", 1), get_task("a", 2)])
            .validate()
            .unwrap_err()
            .to_string();
        assert!(err.contains("Duplicate task name 'a'"), "{err}");
    }

    #[test]
    fn test_validate_path_without_placeholder_fails() {
        let task = Task::Path {
            name: "ids".to_string(),
            weight: 1,
            path: "/rest/1".to_string(),
            values: vec![ParamValue::Integer(1)],
            headers: BTreeMap::new(),
        };
        let err = config_with(vec![task]).validate().unwrap_err().to_string();
        assert!(err.contains("placeholder"), "{err}");
    }

    #[test]
    fn test_validate_dot_segment_values_fail() {
        for value in ["..", ".", ""] {
            let task = Task::Path {
                name: "ids".to_string(),
                weight: 1,
                path: "/rest/{value}".to_string(),
                values: vec![value.into()],
                headers: BTreeMap::new(),
            };
            let err = config_with(vec![task]).validate().unwrap_err().to_string();
            assert!(err.contains("not a usable path segment"), "{value:?}: {err}");
        }
    }

    #[test]
    fn test_path_values_are_encoded_as_one_segment() {
        let task = Task::Path {
            name: "ids".to_string(),
            weight: 1,
            path: "/rest/{value}".to_string(),
            values: vec!["50%".into(), "a b".into(), "1/2".into(), "x?y#z".into(), "a+b".into()],
            headers: BTreeMap::new(),
        };
        let config = config_with(vec![task]);
        config.validate().unwrap();

        let requests = config.task[0].requests();
        let paths: Vec<&str> = requests.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/rest/50%25",
                "/rest/a%20b",
                "/rest/1%2F2",
                "/rest/x%3Fy%23z",
                "/rest/a%2Bb"
            ]
        );
        assert_eq!(requests[0].label, "/rest/50%");
        assert_eq!(requests[2].label, "/rest/1/2");
    }

    #[test]
    fn test_validate_empty_values_fails() {
        let task = Task::Query {
            name: "names".to_string(),
            weight: 1,
            path: "/rest".to_string(),
            param: "name".to_string(),
            values: vec![],
            headers: BTreeMap::new(),
        };
        let err = config_with(vec![task]).validate().unwrap_err().to_string();
        assert!(err.contains("no requests"), "{err}");
    }

    #[test]
    fn test_validate_bad_wait_times_fail() {
        for wait_time in [
            WaitTime::Constant { seconds: -1.0 },
            WaitTime::Between {
                min_secs: 3.0,
                max_secs: 1.0,
            },
            WaitTime::ConstantPacing { seconds: 0.0 },
            WaitTime::ConstantThroughput { per_second: 0.0 },
            WaitTime::ConstantThroughput {
                per_second: f64::NAN,
            },
        ] {
            let mut config = config_with(vec![get_task("a", 1)]);
            config.settings.wait_time = wait_time.clone();
            assert!(
                config.validate().is_err(),
                "{wait_time:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_host() {
        let mut config = config_with(vec![get_task("a", 1)]);
        config.settings.host = Some("ftp://example.com".to_string());
        assert!(config.validate().is_err());

        config.settings.host = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.settings.host = Some("http://127.0.0.1:3000".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_users_in_flat_mode_fails() {
        let mut config = config_with(vec![get_task("a", 1)]);
        config.settings.virtual_users = 0;
        assert!(config.validate().is_err());

        config.stage = vec![Stage {
            target_vus: 5,
            duration_secs: 10,
        }];
        assert!(config.validate().is_ok(), "stages define VU targets");
    }

    #[test]
    fn test_validate_stage_with_zero_duration_fails() {
        let mut config = config_with(vec![get_task("a", 1)]);
        config.stage = vec![
            Stage {
                target_vus: 10,
                duration_secs: 30,
            },
            Stage {
                target_vus: 20,
                duration_secs: 0,
            },
        ];
        let err_msg = config.validate().unwrap_err().to_string();
        assert!(
            err_msg.contains("duration_secs=0"),
            "Error should mention zero duration: {err_msg}"
        );
    }

    #[test]
    fn test_parse_config_with_stages() {
        let toml_str = r#"
[settings]
virtual_users = 10
duration_secs = 60

[[task]]
type = "get"
name = "all"
weight = 1
paths = ["/rest"]

[[stage]]
target_vus = 10
duration_secs = 30

[[stage]]
target_vus = 50
duration_secs = 60

[[stage]]
target_vus = 0
duration_secs = 30
"#;
        let config = LoadTestConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.stage.len(), 3);
        assert!(config.has_stages());
        assert_eq!(config.total_stage_duration(), 120);
        assert_eq!(config.effective_duration_secs(), 120);
    }

    #[test]
    fn test_effective_duration_without_stages() {
        let config = config_with(vec![get_task("a", 1)]);
        assert!(!config.has_stages());
        assert_eq!(config.total_stage_duration(), 0);
        assert_eq!(config.effective_duration_secs(), 60);
    }

    #[test]
    fn test_load_from_file() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        tmpfile.write_all(ARZT_SCENARIO.as_bytes()).unwrap();
        tmpfile.flush().unwrap();

        let config = LoadTestConfig::load(tmpfile.path()).unwrap();
        assert_eq!(config.task.len(), 3);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = LoadTestConfig::load(Path::new("/nonexistent/path.toml"));
        assert!(matches!(
            result.unwrap_err(),
            LoadTestError::ConfigIo { .. }
        ));
    }

    #[test]
    fn test_unknown_task_type_is_parse_error() {
        let toml_str = r#"
[settings]
virtual_users = 1
duration_secs = 1

[[task]]
type = "post"
name = "create"
weight = 1
"#;
        assert!(matches!(
            LoadTestConfig::from_toml(toml_str).unwrap_err(),
            LoadTestError::ConfigParse { .. }
        ));
    }

    #[test]
    fn test_timeout_as_duration() {
        assert_eq!(settings().timeout_as_duration(), Duration::from_millis(5000));
    }
}
