//! Metrics module for Prometheus-based monitoring.
//!
//! Tracks queue depth and rejections, admissions, job outcomes, transcription
//! latency and worker counts.
//!
//! # Example
//!
//! ```ignore
//! use transcription_queue::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics()?;
//!
//! let collector = MetricsCollector::new();
//! collector.update_queue_depth(3);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ACTIVE_WORKERS, ADMISSIONS_TOTAL, JOBS_IN_PROGRESS, JOBS_TOTAL, QUEUE_DEPTH,
    QUEUE_REJECTIONS_TOTAL, REGISTRY, RESOLVE_ERRORS_TOTAL, TRANSCRIPTION_DURATION,
};
