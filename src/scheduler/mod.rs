//! In-process transcription scheduling.
//!
//! - **JobQueue**: bounded FIFO buffer, fail-fast enqueue, cancellable dequeue
//! - **WorkerPool**: fixed set of workers that transcribe jobs and resolve
//!   each recording to `Ready` or `Failed`
//! - **TranscriptionJob**: the unit of work, keyed by recording ID
//!
//! # Architecture
//!
//! ```text
//!          ┌─────────────────────┐
//!          │  RecordingService   │  confirm_upload / retry
//!          └──────────┬──────────┘
//!                     │ enqueue (QueueFull → backpressure)
//!              ┌──────▼───────┐
//!              │   JobQueue   │
//!              └──────┬───────┘
//!        ┌────────────┼────────────┐
//!        ▼            ▼            ▼
//!   ┌─────────┐  ┌─────────┐  ┌─────────┐
//!   │ Worker 0│  │ Worker 1│  │ Worker N│ ── Transcriber
//!   └────┬────┘  └────┬────┘  └────┬────┘
//!        └────────────┼────────────┘
//!                     ▼
//!          RecordingRepository (Transcribing → Ready | Failed)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use transcription_queue::scheduler::{JobQueue, WorkerPool, WorkerPoolConfig};
//!
//! let queue = Arc::new(JobQueue::new(100));
//! let mut pool = WorkerPool::new(WorkerPoolConfig::new(4), queue, transcriber, repository);
//!
//! let root = CancellationToken::new();
//! pool.start(&root)?;
//! // ... admit jobs ...
//! pool.stop().await?;
//! ```
//!
//! # Limits
//!
//! Jobs live only in memory. A crash between dequeue and resolve leaves the
//! recording in `Transcribing`; `RecordingService::fail_orphaned` is the
//! operator's way out.

pub mod job;
pub mod queue;
pub mod worker_pool;

pub use job::{JobOutcome, TranscriptionJob};
pub use queue::{JobQueue, QueueError, QueueStats};
pub use worker_pool::{PoolError, PoolStats, WorkerPool, WorkerPoolConfig};
