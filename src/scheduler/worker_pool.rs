//! Worker pool that drains the transcription queue.
//!
//! Each worker runs as an independent tokio task looping
//! dequeue → transcribe → resolve until told to stop:
//!
//! ```text
//!  Idle ──► Dequeuing ──► Transcribing ──► Resolving ──► Idle
//!               │
//!               └── Cancelled / QueueClosed ──► Stopped
//! ```
//!
//! Only the dequeue observes cancellation. A job that has left the queue is
//! always transcribed and resolved to `Ready` or `Failed` before its worker
//! exits, so [`WorkerPool::stop`] never strands a recording in
//! `Transcribing`.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TranscriptionError;
use crate::metrics::MetricsCollector;
use crate::recording::Transition;
use crate::storage::RecordingRepository;
use crate::transcription::{Transcriber, Transcript};

use super::job::{JobOutcome, TranscriptionJob};
use super::queue::{JobQueue, QueueError};

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Pool is already running.
    #[error("Pool is already running")]
    AlreadyRunning,

    /// Pool is not running.
    #[error("Pool is not running")]
    NotRunning,

    /// The pool was configured with no workers.
    #[error("Worker pool needs at least one worker")]
    NoWorkers,
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker tasks to spawn.
    pub num_workers: usize,
    /// Deadline for a single transcription call. `None` waits indefinitely.
    pub transcription_timeout: Option<Duration>,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            transcription_timeout: None,
        }
    }
}

impl WorkerPoolConfig {
    /// Creates a new configuration with the specified number of workers.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers,
            ..Default::default()
        }
    }

    /// Sets the transcription deadline.
    pub fn with_transcription_timeout(mut self, timeout: Duration) -> Self {
        self.transcription_timeout = Some(timeout);
        self
    }
}

/// Statistics about the worker pool.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Total number of workers in the pool.
    pub num_workers: usize,
    /// Number of workers currently processing a job.
    pub active_workers: usize,
    /// Jobs resolved to `Ready`.
    pub jobs_completed: u64,
    /// Jobs resolved to `Failed`, timeouts included.
    pub jobs_failed: u64,
    /// Subset of `jobs_failed` that hit the transcription deadline.
    pub jobs_timed_out: u64,
    /// Terminal status writes the repository refused or failed.
    pub resolve_errors: u64,
    /// Average transcription duration.
    pub average_job_duration: Duration,
}

impl PoolStats {
    /// Returns the total number of jobs processed (completed + failed).
    pub fn total_processed(&self) -> u64 {
        self.jobs_completed + self.jobs_failed
    }

    /// Returns the success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.jobs_completed as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
#[derive(Debug, Default)]
struct SharedPoolStats {
    jobs_completed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_timed_out: AtomicU64,
    resolve_errors: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicUsize,
    live_workers: AtomicUsize,
}

impl SharedPoolStats {
    fn new() -> Self {
        Self::default()
    }

    fn record_outcome(&self, outcome: JobOutcome, duration: Duration) {
        match outcome {
            JobOutcome::Completed => {
                self.jobs_completed.fetch_add(1, Ordering::SeqCst);
            }
            JobOutcome::Failed => {
                self.jobs_failed.fetch_add(1, Ordering::SeqCst);
            }
            JobOutcome::TimedOut => {
                self.jobs_failed.fetch_add(1, Ordering::SeqCst);
                self.jobs_timed_out.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.total_duration_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
    }

    fn record_resolve_error(&self) {
        self.resolve_errors.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Returns the live worker count after the change.
    fn worker_started(&self) -> usize {
        self.live_workers.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn worker_stopped(&self) -> usize {
        self.live_workers.fetch_sub(1, Ordering::SeqCst) - 1
    }

    fn to_pool_stats(&self, num_workers: usize) -> PoolStats {
        let completed = self.jobs_completed.load(Ordering::SeqCst);
        let failed = self.jobs_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);

        let total_jobs = completed + failed;
        let average_duration = if total_jobs > 0 {
            Duration::from_millis(total_duration_ms / total_jobs)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers,
            active_workers: self.active_workers.load(Ordering::SeqCst),
            jobs_completed: completed,
            jobs_failed: failed,
            jobs_timed_out: self.jobs_timed_out.load(Ordering::SeqCst),
            resolve_errors: self.resolve_errors.load(Ordering::SeqCst),
            average_job_duration: average_duration,
        }
    }
}

/// Worker pool that manages multiple workers processing jobs from a queue.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<JobQueue>,
    transcriber: Arc<dyn Transcriber>,
    repository: Arc<dyn RecordingRepository>,
    /// Present while running; a child of the token passed to `start`.
    cancel: Option<CancellationToken>,
    worker_handles: Vec<JoinHandle<()>>,
    stats: Arc<SharedPoolStats>,
}

impl WorkerPool {
    /// Creates a stopped pool. Nothing is spawned until [`start`](Self::start).
    pub fn new(
        config: WorkerPoolConfig,
        queue: Arc<JobQueue>,
        transcriber: Arc<dyn Transcriber>,
        repository: Arc<dyn RecordingRepository>,
    ) -> Self {
        Self {
            config,
            queue,
            transcriber,
            repository,
            cancel: None,
            worker_handles: Vec::new(),
            stats: Arc::new(SharedPoolStats::new()),
        }
    }

    /// Spawns the configured number of workers and returns immediately.
    ///
    /// Workers stop when `parent` is cancelled, when [`stop`](Self::stop) is
    /// called, or when the queue is closed and drained.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - `PoolError::AlreadyRunning` if the pool has not been stopped since
    ///   the last `start`
    /// - `PoolError::NoWorkers` if configured with zero workers
    pub fn start(&mut self, parent: &CancellationToken) -> Result<(), PoolError> {
        if self.cancel.is_some() {
            return Err(PoolError::AlreadyRunning);
        }
        if self.config.num_workers == 0 {
            return Err(PoolError::NoWorkers);
        }

        let cancel = parent.child_token();

        for i in 0..self.config.num_workers {
            let worker = Worker {
                id: format!("worker-{}", i),
                queue: Arc::clone(&self.queue),
                transcriber: Arc::clone(&self.transcriber),
                repository: Arc::clone(&self.repository),
                cancel: cancel.clone(),
                transcription_timeout: self.config.transcription_timeout,
                stats: Arc::clone(&self.stats),
                metrics: MetricsCollector::new(),
            };

            self.worker_handles.push(tokio::spawn(worker.run()));
        }

        self.cancel = Some(cancel);
        info!(num_workers = self.config.num_workers, "Worker pool started");

        Ok(())
    }

    /// Stops accepting new jobs and waits for in-flight jobs to resolve.
    ///
    /// Jobs still buffered in the queue stay there.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::NotRunning` if the pool was never started or has
    /// already been stopped.
    pub async fn stop(&mut self) -> Result<(), PoolError> {
        let Some(cancel) = self.cancel.take() else {
            return Err(PoolError::NotRunning);
        };

        info!("Stopping worker pool");
        cancel.cancel();
        self.join_workers().await;
        info!("Worker pool stopped");

        Ok(())
    }

    /// Closes the queue and waits until workers have resolved every buffered
    /// job.
    ///
    /// Producers see `QueueClosed` from this point on.
    ///
    /// # Errors
    ///
    /// Returns `PoolError::NotRunning` if the pool is not running.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        let Some(cancel) = self.cancel.take() else {
            return Err(PoolError::NotRunning);
        };

        info!(pending_jobs = self.queue.len(), "Draining worker pool");
        self.queue.close();
        self.join_workers().await;
        // Workers are gone; this only releases the child token.
        cancel.cancel();
        info!("Worker pool drained");

        Ok(())
    }

    async fn join_workers(&mut self) {
        for handle in self.worker_handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats(self.config.num_workers)
    }

    /// Returns whether the pool is currently running.
    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    /// Returns the number of workers in the pool.
    pub fn num_workers(&self) -> usize {
        self.config.num_workers
    }

    /// Returns a reference to the job queue.
    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Detached workers finish their current job, then exit.
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
    }
}

/// Why a transcription attempt produced no transcript.
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    #[error("transcription exceeded {0:?}")]
    TimedOut(Duration),

    #[error("transcriber panicked")]
    Panicked,
}

/// A single worker that processes jobs from the queue.
struct Worker {
    id: String,
    queue: Arc<JobQueue>,
    transcriber: Arc<dyn Transcriber>,
    repository: Arc<dyn RecordingRepository>,
    cancel: CancellationToken,
    transcription_timeout: Option<Duration>,
    stats: Arc<SharedPoolStats>,
    metrics: MetricsCollector,
}

/// Counts a worker as live until dropped, including by a panic unwinding
/// out of [`Worker::run`].
struct LiveWorker<'a> {
    stats: &'a SharedPoolStats,
    metrics: &'a MetricsCollector,
}

impl<'a> LiveWorker<'a> {
    fn enter(stats: &'a SharedPoolStats, metrics: &'a MetricsCollector) -> Self {
        metrics.update_workers(stats.worker_started());
        Self { stats, metrics }
    }
}

impl Drop for LiveWorker<'_> {
    fn drop(&mut self) {
        self.metrics.update_workers(self.stats.worker_stopped());
    }
}

/// Counts a job as in progress until dropped.
struct ActiveJob<'a> {
    stats: &'a SharedPoolStats,
    metrics: &'a MetricsCollector,
}

impl<'a> ActiveJob<'a> {
    fn enter(stats: &'a SharedPoolStats, metrics: &'a MetricsCollector) -> Self {
        stats.increment_active();
        metrics.inc_jobs_in_progress();
        Self { stats, metrics }
    }
}

impl Drop for ActiveJob<'_> {
    fn drop(&mut self) {
        self.stats.decrement_active();
        self.metrics.dec_jobs_in_progress();
    }
}

impl Worker {
    /// Main worker loop.
    async fn run(self) {
        let _live = LiveWorker::enter(&self.stats, &self.metrics);
        info!(worker_id = %self.id, "Worker started");

        loop {
            match self.queue.dequeue(&self.cancel).await {
                Ok(job) => {
                    self.metrics.update_queue_depth(self.queue.len());
                    self.process_job(job).await;
                }
                Err(QueueError::Cancelled) => {
                    info!(worker_id = %self.id, "Worker received shutdown signal");
                    break;
                }
                Err(QueueError::QueueClosed) => {
                    info!(worker_id = %self.id, "Queue closed and drained");
                    break;
                }
                Err(e) => {
                    // dequeue only yields the two above; anything else is a bug.
                    error!(worker_id = %self.id, error = %e, "Unexpected dequeue error");
                    break;
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    /// Transcribes one job and resolves its recording to a terminal status.
    async fn process_job(&self, job: TranscriptionJob) {
        let record_id = job.record_id();

        info!(
            worker_id = %self.id,
            record_id = %record_id,
            retry_count = job.retry_count(),
            "Processing job"
        );

        let _active = ActiveJob::enter(&self.stats, &self.metrics);

        let start_time = Instant::now();
        let attempt = self.transcribe(&job).await;
        let duration = start_time.elapsed();

        let (outcome, transition, transcript) = match attempt {
            Ok(transcript) => {
                info!(
                    worker_id = %self.id,
                    record_id = %record_id,
                    duration_ms = duration.as_millis() as u64,
                    language = ?transcript.language,
                    "Transcription succeeded"
                );
                (JobOutcome::Completed, Transition::Complete, Some(transcript.text))
            }
            Err(e) => {
                let outcome = match e {
                    AttemptError::TimedOut(_) => JobOutcome::TimedOut,
                    _ => JobOutcome::Failed,
                };
                warn!(
                    worker_id = %self.id,
                    record_id = %record_id,
                    duration_ms = duration.as_millis() as u64,
                    error = %e,
                    "Transcription failed"
                );
                (outcome, Transition::Fail, None)
            }
        };

        self.stats.record_outcome(outcome, duration);
        self.metrics.record_job(outcome, duration);

        self.resolve(record_id, transition, transcript).await;
    }

    /// Calls the transcriber, applying the deadline and containing panics so
    /// the job still reaches a terminal status. Blank text counts as a
    /// failure.
    async fn transcribe(&self, job: &TranscriptionJob) -> Result<Transcript, AttemptError> {
        let call = AssertUnwindSafe(self.transcriber.transcribe(job.audio_locator())).catch_unwind();

        let result = match self.transcription_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| AttemptError::TimedOut(limit))?,
            None => call.await,
        };

        let transcript = match result {
            Ok(transcription) => transcription?,
            Err(_) => return Err(AttemptError::Panicked),
        };

        if transcript.is_blank() {
            return Err(TranscriptionError::EmptyTranscript.into());
        }
        Ok(transcript)
    }

    /// Applies the single terminal status write. Failures are logged and
    /// swallowed; the job is never re-enqueued.
    async fn resolve(
        &self,
        record_id: uuid::Uuid,
        transition: Transition,
        transcript: Option<String>,
    ) {
        let new_status = transition.target();

        match self
            .repository
            .compare_and_set_status(record_id, transition.source(), new_status, transcript)
            .await
        {
            Ok(_) => {
                debug!(
                    worker_id = %self.id,
                    record_id = %record_id,
                    status = %new_status,
                    "Recording resolved"
                );
            }
            Err(e) => {
                self.stats.record_resolve_error();
                self.metrics.record_resolve_error();
                error!(
                    worker_id = %self.id,
                    record_id = %record_id,
                    status = %new_status,
                    error = %e,
                    "Failed to resolve recording status"
                );
            }
        }
    }
}
