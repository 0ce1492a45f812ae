//! Recording status state machine.
//!
//! Valid transitions:
//! - PendingUpload -> Transcribing (upload confirmed, job admitted)
//! - Transcribing -> Ready (transcript persisted)
//! - Transcribing -> Failed (transcription failed, or admission rolled back)
//! - Failed -> Transcribing (retry requested, job admitted)
//!
//! Everything else is rejected. The repository enforces these rules on every
//! compare-and-set so no caller can move a recording along an illegal edge.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of a recording's transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    /// Audio upload has been issued but not yet confirmed.
    PendingUpload,
    /// Exactly one job for this recording is queued or being processed.
    Transcribing,
    /// Transcript available.
    Ready,
    /// Transcription failed; may be retried.
    Failed,
}

impl RecordingStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [RecordingStatus; 4] = [
        RecordingStatus::PendingUpload,
        RecordingStatus::Transcribing,
        RecordingStatus::Ready,
        RecordingStatus::Failed,
    ];

    /// Statuses reachable from `self` in one step.
    pub fn allowed_targets(self) -> &'static [RecordingStatus] {
        match self {
            RecordingStatus::PendingUpload => &[RecordingStatus::Transcribing],
            RecordingStatus::Transcribing => &[RecordingStatus::Ready, RecordingStatus::Failed],
            RecordingStatus::Failed => &[RecordingStatus::Transcribing],
            RecordingStatus::Ready => &[],
        }
    }

    /// Check if a transition between two statuses is allowed.
    pub fn can_transition_to(self, to: RecordingStatus) -> bool {
        self.allowed_targets().contains(&to)
    }

    /// Returns whether `from -> to` is a retry admission, which bumps the
    /// recording's retry counter.
    pub fn is_retry(from: RecordingStatus, to: RecordingStatus) -> bool {
        from == RecordingStatus::Failed && to == RecordingStatus::Transcribing
    }

    /// Returns true for statuses a worker resolves a job into.
    pub fn is_terminal(self) -> bool {
        matches!(self, RecordingStatus::Ready | RecordingStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RecordingStatus::PendingUpload => "pending_upload",
            RecordingStatus::Transcribing => "transcribing",
            RecordingStatus::Ready => "ready",
            RecordingStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown status name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown recording status '{0}'")]
pub struct ParseStatusError(pub String);

impl FromStr for RecordingStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RecordingStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

/// A producer- or worker-initiated move along the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Upload confirmed; admit the first job.
    ConfirmUpload,
    /// Failed recording re-submitted.
    Retry,
    /// Worker resolved the job successfully.
    Complete,
    /// Worker resolved the job as failed, or admission was rolled back.
    Fail,
}

impl Transition {
    /// Status the recording must currently be in.
    pub fn source(self) -> RecordingStatus {
        match self {
            Transition::ConfirmUpload => RecordingStatus::PendingUpload,
            Transition::Retry => RecordingStatus::Failed,
            Transition::Complete | Transition::Fail => RecordingStatus::Transcribing,
        }
    }

    /// Status the recording ends up in.
    pub fn target(self) -> RecordingStatus {
        match self {
            Transition::ConfirmUpload | Transition::Retry => RecordingStatus::Transcribing,
            Transition::Complete => RecordingStatus::Ready,
            Transition::Fail => RecordingStatus::Failed,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::ConfirmUpload => "confirm_upload",
            Transition::Retry => "retry",
            Transition::Complete => "complete",
            Transition::Fail => "fail",
        };
        f.write_str(name)
    }
}
