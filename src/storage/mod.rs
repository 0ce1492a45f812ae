//! Recording persistence.
//!
//! This module provides the repository the pipeline uses to drive the
//! recording status state machine.
//!
//! # Overview
//!
//! - **RecordingRepository**: the capability trait (atomic compare-and-set)
//! - **InMemoryRecordingRepository**: mutex-guarded map for tests and single-process use
//! - **SqliteRecordingRepository**: sqlx/SQLite store, CAS as one conditional `UPDATE`
//!
//! # Usage
//!
//! ```rust,ignore
//! use transcription_queue::storage::{RecordingRepository, SqliteRecordingRepository};
//! use transcription_queue::recording::{Recording, RecordingStatus};
//!
//! let repo = SqliteRecordingRepository::connect("sqlite://recordings.db").await?;
//! let recording = Recording::new("uploads/standup.wav");
//! repo.insert(recording.clone()).await?;
//!
//! repo.compare_and_set_status(
//!     recording.id,
//!     RecordingStatus::PendingUpload,
//!     RecordingStatus::Transcribing,
//!     None,
//! )
//! .await?;
//! ```

pub mod database;
pub mod repository;
pub mod schema;

pub use database::SqliteRecordingRepository;
pub use repository::{InMemoryRecordingRepository, RecordingRepository};
