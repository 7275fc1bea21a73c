//! Load generator for the Arzt (doctor lookup) REST service.
//!
//! Simulated users repeatedly pick weighted GET tasks, pace themselves
//! with a configurable wait time, and report latency and error metrics.
//! The built-in scenario mirrors the service's reference load profile:
//! 500 users, each capped at 0.1 task iterations per second.

pub mod loadtest;
