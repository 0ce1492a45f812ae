//! Job definitions for the transcription scheduler.
//!
//! A [`TranscriptionJob`] is an in-memory, immutable description of one
//! recording awaiting transcription. Jobs are created by the admission path
//! after it wins the conditional status transition, consumed by exactly one
//! worker, and never persisted.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A unit of transcription work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionJob {
    /// Recording this job will resolve.
    record_id: Uuid,
    /// Opaque reference (e.g. a storage key) handed to the transcriber.
    audio_locator: String,
    /// How many times this recording has been re-submitted after a failure.
    retry_count: u32,
    /// When the job was admitted.
    created_at: DateTime<Utc>,
}

impl TranscriptionJob {
    /// Creates a first-attempt job.
    pub fn new(record_id: Uuid, audio_locator: impl Into<String>) -> Self {
        Self::with_retry_count(record_id, audio_locator, 0)
    }

    /// Creates a job carrying an explicit retry count.
    pub fn with_retry_count(
        record_id: Uuid,
        audio_locator: impl Into<String>,
        retry_count: u32,
    ) -> Self {
        Self {
            record_id,
            audio_locator: audio_locator.into(),
            retry_count,
            created_at: Utc::now(),
        }
    }

    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    pub fn audio_locator(&self) -> &str {
        &self.audio_locator
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns how long the job has existed since admission.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }
}

impl fmt::Display for TranscriptionJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job(record={}, retry={}, audio={})",
            self.record_id, self.retry_count, self.audio_locator
        )
    }
}

/// How a dequeued job was resolved by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Transcript persisted, recording is `Ready`.
    Completed,
    /// Transcriber failed, recording is `Failed`.
    Failed,
    /// Transcriber exceeded the configured deadline, recording is `Failed`.
    TimedOut,
}

impl JobOutcome {
    /// Label used for metrics and log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Failed => "failed",
            JobOutcome::TimedOut => "timeout",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Completed)
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_starts_at_zero_retries() {
        let id = Uuid::new_v4();
        let job = TranscriptionJob::new(id, "uploads/a.wav");

        assert_eq!(job.record_id(), id);
        assert_eq!(job.audio_locator(), "uploads/a.wav");
        assert_eq!(job.retry_count(), 0);
        assert!(job.age() >= chrono::Duration::zero());
    }

    #[test]
    fn test_job_with_retry_count() {
        let job = TranscriptionJob::with_retry_count(Uuid::new_v4(), "k", 3);
        assert_eq!(job.retry_count(), 3);
    }

    #[test]
    fn test_job_display_mentions_record() {
        let id = Uuid::new_v4();
        let job = TranscriptionJob::new(id, "uploads/b.mp3");
        let shown = job.to_string();

        assert!(shown.contains(&id.to_string()));
        assert!(shown.contains("uploads/b.mp3"));
    }

    #[test]
    fn test_job_outcome_labels() {
        assert_eq!(JobOutcome::Completed.to_string(), "completed");
        assert_eq!(JobOutcome::Failed.to_string(), "failed");
        assert_eq!(JobOutcome::TimedOut.to_string(), "timeout");
        assert!(JobOutcome::Completed.is_success());
        assert!(!JobOutcome::TimedOut.is_success());
    }
}
