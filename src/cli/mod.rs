//! Command-line interface for transcription-queue.
//!
//! Provides commands for registering recordings, processing them through the
//! queue, and inspecting their status.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
