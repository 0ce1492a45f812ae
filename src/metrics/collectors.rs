//! High-level recording interface over the raw Prometheus metrics.
//!
//! Every method is a no-op for a metric whose static has not been
//! initialized, so library code can record unconditionally.

use std::time::Duration;

use crate::scheduler::{JobOutcome, QueueError};

use super::prometheus::{
    ACTIVE_WORKERS, ADMISSIONS_TOTAL, JOBS_IN_PROGRESS, JOBS_TOTAL, QUEUE_DEPTH,
    QUEUE_REJECTIONS_TOTAL, RESOLVE_ERRORS_TOTAL, TRANSCRIPTION_DURATION,
};

/// Metrics collector for the transcription pipeline.
///
/// # Example
///
/// ```ignore
/// use transcription_queue::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics()?;
/// let collector = MetricsCollector::new();
/// collector.update_queue_depth(12);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Record a resolved job and how long the transcription call took.
    pub fn record_job(&self, outcome: JobOutcome, duration: Duration) {
        if let Some(jobs_total) = JOBS_TOTAL.get() {
            jobs_total.with_label_values(&[outcome.as_str()]).inc();
        }

        if let Some(histogram) = TRANSCRIPTION_DURATION.get() {
            histogram.observe(duration.as_secs_f64());
        }

        tracing::trace!(
            outcome = outcome.as_str(),
            duration_secs = duration.as_secs_f64(),
            "Recorded job metric"
        );
    }

    /// Record an enqueue attempt the queue refused.
    pub fn record_rejection(&self, error: QueueError) {
        let reason = match error {
            QueueError::QueueFull => "full",
            QueueError::QueueClosed => "closed",
            // Consumer-side errors never come from enqueue.
            QueueError::QueueEmpty | QueueError::Cancelled => return,
        };

        if let Some(rejections) = QUEUE_REJECTIONS_TOTAL.get() {
            rejections.with_label_values(&[reason]).inc();
        }

        tracing::trace!(reason = reason, "Recorded queue rejection metric");
    }

    /// Record a job admitted by `transition` (`confirm_upload` or `retry`).
    pub fn record_admission(&self, transition: &str) {
        if let Some(admissions) = ADMISSIONS_TOTAL.get() {
            admissions.with_label_values(&[transition]).inc();
        }
    }

    /// Record a terminal status write that did not land.
    pub fn record_resolve_error(&self) {
        if let Some(counter) = RESOLVE_ERRORS_TOTAL.get() {
            counter.inc();
        }
    }

    pub fn update_queue_depth(&self, depth: usize) {
        if let Some(queue_depth) = QUEUE_DEPTH.get() {
            queue_depth.set(depth as f64);
        }
    }

    /// Update the count of live workers.
    pub fn update_workers(&self, count: usize) {
        if let Some(active_workers) = ACTIVE_WORKERS.get() {
            active_workers.set(count as f64);
        }

        tracing::trace!(count = count, "Updated active workers metric");
    }

    pub fn inc_jobs_in_progress(&self) {
        if let Some(jobs_in_progress) = JOBS_IN_PROGRESS.get() {
            jobs_in_progress.inc();
        }
    }

    pub fn dec_jobs_in_progress(&self) {
        if let Some(jobs_in_progress) = JOBS_IN_PROGRESS.get() {
            jobs_in_progress.dec();
        }
    }
}
