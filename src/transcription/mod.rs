//! Transcription capability.
//!
//! The pipeline treats the transcription engine as a black box reached
//! through the single-method [`Transcriber`] trait, injected into the worker
//! pool at construction. [`HttpTranscriber`] talks to a remote service; tests
//! substitute their own implementations.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::TranscriptionError;

pub use http::HttpTranscriber;

/// Text produced from a recording's audio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    /// Detected language, when the engine reports one.
    #[serde(default)]
    pub language: Option<String>,
}

impl Transcript {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Returns whether the transcript has no visible text.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Turns an audio reference into a transcript.
///
/// Implementations may be internally parallel; the pipeline imposes no retry
/// or backoff policy of its own.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_locator: &str) -> Result<Transcript, TranscriptionError>;
}
