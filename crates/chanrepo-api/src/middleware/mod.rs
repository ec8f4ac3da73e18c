//! # Middleware
//!
//! - `metrics`: per-request Prometheus counters.

pub mod metrics;
