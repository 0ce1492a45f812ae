//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by the transcription
//! pipeline and provides functions for initializing, registering, and
//! exporting them.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all pipeline metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Number of jobs buffered in the queue.
pub static QUEUE_DEPTH: OnceLock<Gauge> = OnceLock::new();

/// Enqueue attempts refused by the queue, labeled by reason (`full`, `closed`).
pub static QUEUE_REJECTIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Jobs admitted into the queue, labeled by transition (`confirm_upload`, `retry`).
pub static ADMISSIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Number of jobs currently being transcribed.
pub static JOBS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Total jobs resolved, labeled by outcome (`completed`, `failed`, `timeout`).
pub static JOBS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Transcription call duration in seconds.
pub static TRANSCRIPTION_DURATION: OnceLock<Histogram> = OnceLock::new();

/// Resolve writes the repository refused or failed.
pub static RESOLVE_ERRORS_TOTAL: OnceLock<Counter> = OnceLock::new();

/// Number of live worker tasks.
pub static ACTIVE_WORKERS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Later calls build a fresh registry but leave the
/// statics pointing at the first one.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails, typically due to
/// duplicate metric names or invalid metric configurations.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    // Queue metrics
    let queue_depth = Gauge::new(
        "transcription_queue_depth",
        "Number of jobs buffered in the transcription queue",
    )?;

    let queue_rejections_total = CounterVec::new(
        Opts::new(
            "transcription_queue_rejections_total",
            "Enqueue attempts refused by the transcription queue",
        ),
        &["reason"],
    )?;

    let admissions_total = CounterVec::new(
        Opts::new(
            "transcription_admissions_total",
            "Jobs admitted into the transcription queue",
        ),
        &["transition"],
    )?;

    // Job metrics
    let jobs_in_progress = Gauge::new(
        "transcription_jobs_in_progress",
        "Number of jobs currently being transcribed",
    )?;

    let jobs_total = CounterVec::new(
        Opts::new("transcription_jobs_total", "Total transcription jobs resolved"),
        &["outcome"],
    )?;

    let transcription_duration = Histogram::with_opts(
        HistogramOpts::new(
            "transcription_duration_seconds",
            "Transcription call duration in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0]),
    )?;

    let resolve_errors_total = Counter::new(
        "transcription_resolve_errors_total",
        "Terminal status writes the repository refused or failed",
    )?;

    // Worker metrics
    let active_workers = Gauge::new(
        "transcription_active_workers",
        "Number of live transcription workers",
    )?;

    registry.register(Box::new(queue_depth.clone()))?;
    registry.register(Box::new(queue_rejections_total.clone()))?;
    registry.register(Box::new(admissions_total.clone()))?;
    registry.register(Box::new(jobs_in_progress.clone()))?;
    registry.register(Box::new(jobs_total.clone()))?;
    registry.register(Box::new(transcription_duration.clone()))?;
    registry.register(Box::new(resolve_errors_total.clone()))?;
    registry.register(Box::new(active_workers.clone()))?;

    // Already-set statics mean a previous call won; keep those.
    let _ = REGISTRY.set(registry);
    let _ = QUEUE_DEPTH.set(queue_depth);
    let _ = QUEUE_REJECTIONS_TOTAL.set(queue_rejections_total);
    let _ = ADMISSIONS_TOTAL.set(admissions_total);
    let _ = JOBS_IN_PROGRESS.set(jobs_in_progress);
    let _ = JOBS_TOTAL.set(jobs_total);
    let _ = TRANSCRIPTION_DURATION.set(transcription_duration);
    let _ = RESOLVE_ERRORS_TOTAL.set(resolve_errors_total);
    let _ = ACTIVE_WORKERS.set(active_workers);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// If the registry has not been initialized or encoding fails, the returned
/// string is a comment line describing the problem.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
