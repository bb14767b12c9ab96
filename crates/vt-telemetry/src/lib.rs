//! Observability for the vrc-text-bridge binaries and library.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`
//! - **Metrics**: labelled counters and gauges with Prometheus/JSON export

pub mod logging;
pub mod metrics;
