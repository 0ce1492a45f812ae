//! Recording repository abstraction and an in-memory implementation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RepositoryError;
use crate::recording::{Recording, RecordingStatus};

/// Persistence collaborator for recordings.
///
/// [`compare_and_set_status`](RecordingRepository::compare_and_set_status) is
/// the only guard against two callers admitting a job for the same
/// recording, so implementations must perform it as one atomic update.
#[async_trait]
pub trait RecordingRepository: Send + Sync {
    /// Store a new recording.
    async fn insert(&self, recording: Recording) -> Result<(), RepositoryError>;

    /// Fetch a recording by ID.
    async fn get(&self, id: Uuid) -> Result<Recording, RepositoryError>;

    /// Atomically move a recording from `expected` to `new_status`.
    ///
    /// `transcript` is stored only when moving to `Ready`. A move from
    /// `Failed` to `Transcribing` increments the retry counter.
    ///
    /// # Errors
    ///
    /// - `InvalidTransition` if the state machine forbids `expected -> new_status`
    /// - `NotFound` if no such recording exists
    /// - `Conflict` if the recording is not currently in `expected`
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: RecordingStatus,
        new_status: RecordingStatus,
        transcript: Option<String>,
    ) -> Result<Recording, RepositoryError>;

    /// List recordings in the given status, oldest first.
    async fn list_by_status(
        &self,
        status: RecordingStatus,
    ) -> Result<Vec<Recording>, RepositoryError>;
}

/// Rejects pairs the state machine forbids before touching storage.
pub(crate) fn ensure_transition(
    expected: RecordingStatus,
    new_status: RecordingStatus,
) -> Result<(), RepositoryError> {
    if expected.can_transition_to(new_status) {
        Ok(())
    } else {
        Err(RepositoryError::InvalidTransition {
            from: expected,
            to: new_status,
        })
    }
}

/// Process-local repository backed by a mutex-guarded map.
///
/// Suitable for tests and single-process deployments that do not need the
/// recordings to outlive the process.
#[derive(Debug, Default)]
pub struct InMemoryRecordingRepository {
    recordings: Mutex<HashMap<Uuid, Recording>>,
}

impl InMemoryRecordingRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Recording>> {
        self.recordings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of stored recordings.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordingRepository for InMemoryRecordingRepository {
    async fn insert(&self, recording: Recording) -> Result<(), RepositoryError> {
        let mut recordings = self.lock();
        if recordings.contains_key(&recording.id) {
            return Err(RepositoryError::Duplicate { id: recording.id });
        }
        recordings.insert(recording.id, recording);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Recording, RepositoryError> {
        self.lock()
            .get(&id)
            .cloned()
            .ok_or(RepositoryError::NotFound(id))
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: RecordingStatus,
        new_status: RecordingStatus,
        transcript: Option<String>,
    ) -> Result<Recording, RepositoryError> {
        ensure_transition(expected, new_status)?;

        let mut recordings = self.lock();
        let recording = recordings
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound(id))?;

        if recording.status != expected {
            return Err(RepositoryError::Conflict {
                id,
                expected,
                actual: recording.status,
            });
        }

        recording.apply_status(new_status, transcript);
        Ok(recording.clone())
    }

    async fn list_by_status(
        &self,
        status: RecordingStatus,
    ) -> Result<Vec<Recording>, RepositoryError> {
        let mut matching: Vec<Recording> = self
            .lock()
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        Ok(matching)
    }
}
