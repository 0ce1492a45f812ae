//! transcription-queue: bounded job queue and worker pool for recording
//! transcription.
//!
//! Uploaded recordings are admitted into an in-memory queue through a strict
//! status state machine (`pending_upload → transcribing → ready | failed`,
//! with `failed → transcribing` on retry). A fixed pool of workers drains the
//! queue, calls the transcription service, and records every job's outcome
//! exactly once.

pub mod cli;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod recording;
pub mod scheduler;
pub mod storage;
pub mod transcription;

pub use error::{RepositoryError, TranscriptionError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError};
pub use recording::{AdmissionError, Recording, RecordingService, RecordingStatus};
pub use scheduler::{JobQueue, QueueError, TranscriptionJob, WorkerPool, WorkerPoolConfig};
