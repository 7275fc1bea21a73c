//! Load testing engine for the Arzt REST service.
//!
//! Provides typed TOML scenario configuration, a shared HTTP client,
//! error classification, per-user pacing, HdrHistogram-based metrics,
//! the VU scheduler, and terminal/JSON reporting.

pub mod client;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod pacing;
pub mod report;
pub mod summary;
pub mod vu;
