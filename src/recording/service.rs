//! Producer-side admission control.
//!
//! [`RecordingService`] is the only path by which jobs enter the queue. It
//! keeps one invariant: a recording is `Transcribing` exactly when one job for
//! it is queued or being processed.
//!
//! Admission is check, compare-and-set, enqueue:
//! 1. Read the recording and reject the request if it is not in the
//!    transition's source state. The queue is never touched on rejection.
//! 2. Atomically move it to `Transcribing`. Of two concurrent requests only
//!    one wins this step.
//! 3. Enqueue the job. If the queue refuses, move the recording to `Failed`
//!    so the user can retry, and report the queue condition.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::metrics::MetricsCollector;
use crate::scheduler::{JobQueue, QueueError, TranscriptionJob};
use crate::storage::RecordingRepository;

use super::entry::Recording;
use super::status::{RecordingStatus, Transition};

/// Why a recording was not admitted.
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("Cannot {transition} recording {id} while it is '{status}'")]
    NotAllowed {
        id: Uuid,
        transition: Transition,
        status: RecordingStatus,
    },

    #[error("Recording {0} not found")]
    NotFound(Uuid),

    /// Another request changed the recording between the read and the
    /// compare-and-set.
    #[error("Recording {id} was modified concurrently (now '{actual}')")]
    Conflict { id: Uuid, actual: RecordingStatus },

    #[error("Transcription service busy, try again later")]
    Busy,

    #[error("Transcription queue is shutting down")]
    ShuttingDown,

    #[error("Repository error: {0}")]
    Repository(#[source] RepositoryError),
}

impl AdmissionError {
    /// Returns whether the same request may succeed if repeated later.
    pub fn is_transient(&self) -> bool {
        matches!(self, AdmissionError::Busy)
    }
}

impl From<RepositoryError> for AdmissionError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(id) => AdmissionError::NotFound(id),
            RepositoryError::Conflict { id, actual, .. } => AdmissionError::Conflict { id, actual },
            other => AdmissionError::Repository(other),
        }
    }
}

/// Entry points that move recordings into the queue.
#[derive(Clone)]
pub struct RecordingService {
    repository: Arc<dyn RecordingRepository>,
    queue: Arc<JobQueue>,
    metrics: MetricsCollector,
}

impl RecordingService {
    pub fn new(repository: Arc<dyn RecordingRepository>, queue: Arc<JobQueue>) -> Self {
        Self {
            repository,
            queue,
            metrics: MetricsCollector::new(),
        }
    }

    /// Store a new recording awaiting upload confirmation.
    pub async fn register(&self, audio_locator: &str) -> Result<Recording, AdmissionError> {
        let recording = Recording::new(audio_locator);
        self.repository.insert(recording.clone()).await?;
        info!(record_id = %recording.id, audio_locator = audio_locator, "Recording registered");
        Ok(recording)
    }

    /// Admit the first transcription job for an uploaded recording.
    ///
    /// # Errors
    ///
    /// - `NotAllowed` unless the recording is `PendingUpload`
    /// - `Conflict` if a concurrent request won the transition
    /// - `Busy` / `ShuttingDown` if the queue refused the job; the recording
    ///   is then `Failed` and may be retried
    pub async fn confirm_upload(&self, id: Uuid) -> Result<Recording, AdmissionError> {
        self.apply(id, Transition::ConfirmUpload).await
    }

    /// Re-admit a failed recording, incrementing its retry count.
    ///
    /// Same errors as [`confirm_upload`](Self::confirm_upload), with `Failed`
    /// as the only allowed source status.
    pub async fn retry(&self, id: Uuid) -> Result<Recording, AdmissionError> {
        self.apply(id, Transition::Retry).await
    }

    /// Confirm or retry, whichever the recording's current status allows.
    pub async fn admit(&self, id: Uuid) -> Result<Recording, AdmissionError> {
        let recording = self.repository.get(id).await?;
        let transition = match recording.status {
            RecordingStatus::Failed => Transition::Retry,
            _ => Transition::ConfirmUpload,
        };
        self.apply(id, transition).await
    }

    async fn apply(&self, id: Uuid, transition: Transition) -> Result<Recording, AdmissionError> {
        let current = self.repository.get(id).await?;
        if current.status != transition.source() {
            return Err(AdmissionError::NotAllowed {
                id,
                transition,
                status: current.status,
            });
        }

        let admitted = self
            .repository
            .compare_and_set_status(id, transition.source(), transition.target(), None)
            .await?;

        let job = TranscriptionJob::with_retry_count(
            admitted.id,
            admitted.audio_locator.clone(),
            admitted.retry_count,
        );

        if let Err(e) = self.queue.enqueue(job) {
            self.metrics.record_rejection(e);
            self.roll_back(id, transition, e).await;
            return Err(match e {
                QueueError::QueueClosed => AdmissionError::ShuttingDown,
                _ => AdmissionError::Busy,
            });
        }

        self.metrics.record_admission(&transition.to_string());
        self.metrics.update_queue_depth(self.queue.len());
        info!(
            record_id = %id,
            transition = %transition,
            retry_count = admitted.retry_count,
            "Recording admitted for transcription"
        );

        Ok(admitted)
    }

    /// Undo an admission whose job never reached the queue.
    async fn roll_back(&self, id: Uuid, transition: Transition, cause: QueueError) {
        warn!(
            record_id = %id,
            transition = %transition,
            cause = %cause,
            "Queue refused job, marking recording failed"
        );

        if let Err(e) = self
            .repository
            .compare_and_set_status(
                id,
                Transition::Fail.source(),
                Transition::Fail.target(),
                None,
            )
            .await
        {
            error!(
                record_id = %id,
                error = %e,
                "Rollback failed, recording may be left in transcribing"
            );
        }
    }

    /// Mark every `Transcribing` recording as `Failed`.
    ///
    /// Jobs are held only in memory, so recordings admitted by a process that
    /// has since died stay `Transcribing` forever. Run this only while no
    /// worker pool is processing jobs against the same store. Returns the
    /// IDs that were moved.
    pub async fn fail_orphaned(&self) -> Result<Vec<Uuid>, AdmissionError> {
        let stuck = self
            .repository
            .list_by_status(RecordingStatus::Transcribing)
            .await?;

        let mut failed = Vec::with_capacity(stuck.len());
        for recording in stuck {
            match self
                .repository
                .compare_and_set_status(
                    recording.id,
                    Transition::Fail.source(),
                    Transition::Fail.target(),
                    None,
                )
                .await
            {
                Ok(_) => failed.push(recording.id),
                // Resolved while we were scanning.
                Err(e) if e.is_conflict() => {}
                Err(e) => return Err(e.into()),
            }
        }

        if !failed.is_empty() {
            warn!(count = failed.len(), "Marked orphaned recordings as failed");
        }
        Ok(failed)
    }

    pub fn repository(&self) -> &Arc<dyn RecordingRepository> {
        &self.repository
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }
}
