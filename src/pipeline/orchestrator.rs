//! Pipeline facade wiring the queue, worker pool and admission service.
//!
//! [`Pipeline`] owns one [`JobQueue`] shared by a [`RecordingService`]
//! (producer side) and a [`WorkerPool`] (consumer side), built from a
//! [`PipelineConfig`].

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{RepositoryError, TranscriptionError};
use crate::recording::{AdmissionError, RecordingService};
use crate::scheduler::{JobQueue, PoolError, PoolStats, QueueStats, WorkerPool};
use crate::storage::{RecordingRepository, SqliteRecordingRepository};
use crate::transcription::{HttpTranscriber, Transcriber};

use super::config::{ConfigError, PipelineConfig};

/// Errors that can occur during pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Recording store could not be opened.
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Transcription client could not be built.
    #[error("Transcriber error: {0}")]
    Transcriber(#[from] TranscriptionError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("Admission error: {0}")]
    Admission(#[from] AdmissionError),
}

/// Snapshot of queue and worker statistics.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub queue_capacity: usize,
    pub pending_jobs: usize,
    pub queue_closed: bool,
    pub num_workers: usize,
    pub active_workers: usize,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub jobs_timed_out: u64,
    pub resolve_errors: u64,
    pub average_job_ms: u64,
}

impl PipelineStats {
    fn from_parts(queue: QueueStats, pool: PoolStats) -> Self {
        Self {
            queue_capacity: queue.capacity,
            pending_jobs: queue.pending_jobs,
            queue_closed: queue.closed,
            num_workers: pool.num_workers,
            active_workers: pool.active_workers,
            jobs_completed: pool.jobs_completed,
            jobs_failed: pool.jobs_failed,
            jobs_timed_out: pool.jobs_timed_out,
            resolve_errors: pool.resolve_errors,
            average_job_ms: pool.average_job_duration.as_millis() as u64,
        }
    }
}

/// The transcription pipeline: one queue, its producers and its consumers.
pub struct Pipeline {
    config: PipelineConfig,
    queue: Arc<JobQueue>,
    service: RecordingService,
    pool: WorkerPool,
}

impl Pipeline {
    /// Builds a stopped pipeline around the given collaborators.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` if the configuration is invalid.
    pub fn new(
        config: PipelineConfig,
        repository: Arc<dyn RecordingRepository>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let queue = Arc::new(JobQueue::new(config.queue_capacity));
        let service = RecordingService::new(Arc::clone(&repository), Arc::clone(&queue));
        let pool = WorkerPool::new(
            config.worker_pool_config(),
            Arc::clone(&queue),
            transcriber,
            repository,
        );

        Ok(Self {
            config,
            queue,
            service,
            pool,
        })
    }

    /// Opens the SQLite store and HTTP transcriber named by `config`.
    pub async fn connect(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let repository = SqliteRecordingRepository::connect(&config.database_url).await?;
        let transcriber = HttpTranscriber::new(
            config.transcriber_url.clone(),
            config.transcriber_api_key.clone(),
        )?;

        info!(
            database_url = %config.database_url,
            transcriber_url = %config.transcriber_url,
            "Pipeline collaborators ready"
        );

        Self::open(config, Arc::new(repository), Arc::new(transcriber)).await
    }

    /// Like [`new`](Self::new), but when `fail_orphaned_on_start` is set,
    /// fails leftover `Transcribing` recordings before the pipeline is handed
    /// out. No job can have been admitted yet, so every such recording was
    /// orphaned by an earlier process.
    pub async fn open(
        config: PipelineConfig,
        repository: Arc<dyn RecordingRepository>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Result<Self, PipelineError> {
        let pipeline = Self::new(config, repository, transcriber)?;

        if pipeline.config.fail_orphaned_on_start {
            let failed = pipeline.service.fail_orphaned().await?;
            info!(count = failed.len(), "Orphaned recordings failed at startup");
        }

        Ok(pipeline)
    }

    /// Starts the workers.
    pub async fn start(&mut self, parent: &CancellationToken) -> Result<(), PipelineError> {
        self.pool.start(parent)?;
        Ok(())
    }

    /// Stops the workers after their in-flight jobs; buffered jobs stay queued.
    pub async fn stop(&mut self) -> Result<PipelineStats, PipelineError> {
        self.pool.stop().await?;
        Ok(self.stats())
    }

    /// Closes the queue and waits until every buffered job is resolved.
    pub async fn drain(&mut self) -> Result<PipelineStats, PipelineError> {
        self.pool.shutdown().await?;
        Ok(self.stats())
    }

    pub fn service(&self) -> &RecordingService {
        &self.service
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.pool.is_running()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats::from_parts(self.queue.stats(), self.pool.stats())
    }
}
