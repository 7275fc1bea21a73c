//! Error types for the load testing engine.
//!
//! Defines [`LoadTestError`] for configuration and setup errors and
//! [`RequestError`] for transport and status errors encountered while
//! the simulated users are issuing requests.

/// Errors that occur during config parsing, validation, file I/O, or client setup.
#[derive(Debug, thiserror::Error)]
pub enum LoadTestError {
    /// TOML parse failure -- the config file contains invalid TOML syntax
    /// or does not match the expected schema.
    #[error("Failed to parse config TOML: {source}")]
    ConfigParse {
        #[from]
        source: toml::de::Error,
    },

    /// Semantic validation failure -- the config parsed successfully but
    /// contains invalid values (e.g., no tasks, zero total weight).
    #[error("Config validation error: {message}")]
    ConfigValidation { message: String },

    /// File I/O failure -- the config file could not be read from disk.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigIo {
        source: std::io::Error,
        path: String,
    },

    /// The shared HTTP client could not be constructed.
    #[error("Failed to build HTTP client: {message}")]
    Client { message: String },
}

impl LoadTestError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }
}

/// Failure of a single GET request.
///
/// Each variant is a distinct error category that the metrics pipeline
/// counts and reports separately.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The server answered with a 4xx or 5xx status code.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request exceeded the configured per-request timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection-level failure (DNS resolution, TCP connect, TLS handshake).
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// The request URL could not be built from the host and task path.
    #[error("Invalid URL: {message}")]
    InvalidUrl { message: String },
}

impl RequestError {
    /// Returns `true` for 4xx responses.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Http { status, .. } if (400..500).contains(status))
    }

    /// Returns `true` for 5xx responses.
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Http { status, .. } if *status >= 500)
    }

    /// Returns the error category as a static string for metrics classification.
    ///
    /// Categories: `"http"`, `"timeout"`, `"connection"`, `"url"`.
    pub fn error_category(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Timeout => "timeout",
            Self::Connection { .. } => "connection",
            Self::InvalidUrl { .. } => "url",
        }
    }

    /// Classify a [`reqwest::Error`] into the appropriate [`RequestError`] variant.
    pub fn classify_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection {
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_builder() {
            Self::InvalidUrl {
                message: err.to_string(),
            }
        } else {
            Self::Connection {
                message: err.to_string(),
            }
        }
    }
}
