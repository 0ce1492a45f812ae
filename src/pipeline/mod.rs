//! Pipeline assembly.
//!
//! - **Config**: [`PipelineConfig`] from defaults, environment and builders
//! - **Orchestrator**: [`Pipeline`], the facade that owns the queue and
//!   connects the admission service to the worker pool
//!
//! # Example
//!
//! ```rust,ignore
//! use tokio_util::sync::CancellationToken;
//! use transcription_queue::pipeline::{Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::from_env()?;
//! let mut pipeline = Pipeline::connect(config).await?;
//!
//! let recording = pipeline.service().register("uploads/standup.wav").await?;
//! pipeline.service().confirm_upload(recording.id).await?;
//!
//! pipeline.start(&CancellationToken::new()).await?;
//! let stats = pipeline.drain().await?;
//! println!("{} transcribed, {} failed", stats.jobs_completed, stats.jobs_failed);
//! ```

pub mod config;
pub mod orchestrator;

pub use config::{ConfigError, PipelineConfig};
pub use orchestrator::{Pipeline, PipelineError, PipelineStats};
