//! Error types shared across the transcription pipeline.
//!
//! Defines the errors reported by the two external collaborators the core
//! depends on:
//! - Recording repository (conditional status transitions)
//! - Transcription capability
//!
//! Subsystem-local errors live next to their subsystem (`QueueError`,
//! `PoolError`, `AdmissionError`, `ConfigError`).

use thiserror::Error;
use uuid::Uuid;

use crate::recording::RecordingStatus;

/// Errors that can occur during recording repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Recording {0} not found")]
    NotFound(Uuid),

    #[error("Recording {id} already exists")]
    Duplicate { id: Uuid },

    #[error("Recording {id} is '{actual}', expected '{expected}'")]
    Conflict {
        id: Uuid,
        expected: RecordingStatus,
        actual: RecordingStatus,
    },

    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidTransition {
        from: RecordingStatus,
        to: RecordingStatus,
    },

    #[error("Corrupt recording row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    /// Returns whether the error means the compare-and-set lost a race or the
    /// record was not in the expected state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, RepositoryError::Conflict { .. })
    }
}

/// Errors that can occur while transcribing audio.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("Audio not found: {0}")]
    AudioNotFound(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Transcription service error ({code}): {message}")]
    ServiceError { code: u16, message: String },

    #[error("Failed to parse transcription response: {0}")]
    ParseError(String),

    #[error("Transcription produced no text")]
    EmptyTranscript,

    /// Catch-all for engines with no more specific error.
    #[error("Transcription failed: {0}")]
    Failed(String),
}
