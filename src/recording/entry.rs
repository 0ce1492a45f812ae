use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::status::RecordingStatus;

/// The slice of a persisted recording that the transcription pipeline owns.
///
/// Title, owner and audio metadata belong to the host system and are not
/// modelled here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    pub id: Uuid,
    /// Storage key of the uploaded audio.
    pub audio_locator: String,
    pub status: RecordingStatus,
    /// Set only once the recording is `Ready`.
    #[serde(default)]
    pub transcript: Option<String>,
    /// Number of retry admissions so far.
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recording {
    /// Create a new recording awaiting upload confirmation.
    pub fn new(audio_locator: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), audio_locator)
    }

    /// Create a new recording with a caller-chosen ID.
    pub fn with_id(id: Uuid, audio_locator: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            audio_locator: audio_locator.into(),
            status: RecordingStatus::PendingUpload,
            transcript: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an already-validated status change in place.
    ///
    /// Bumps `retry_count` on a retry admission, stores the transcript when
    /// moving to `Ready`, and clears a stale transcript otherwise.
    pub(crate) fn apply_status(&mut self, new_status: RecordingStatus, transcript: Option<String>) {
        if RecordingStatus::is_retry(self.status, new_status) {
            self.retry_count += 1;
        }
        self.transcript = match new_status {
            RecordingStatus::Ready => transcript,
            _ => None,
        };
        self.status = new_status;
        self.updated_at = Utc::now();
    }
}
