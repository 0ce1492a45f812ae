//! Recording status state machine and admission control.
//!
//! This module provides:
//! - The [`RecordingStatus`] state machine and its legal [`Transition`]s
//! - The [`Recording`] slice the pipeline owns
//! - [`RecordingService`], the producer-side entry points (confirm upload,
//!   retry) that admit jobs into the queue only from valid states

pub mod entry;
pub mod service;
pub mod status;

pub use entry::Recording;
pub use service::{AdmissionError, RecordingService};
pub use status::{ParseStatusError, RecordingStatus, Transition};
