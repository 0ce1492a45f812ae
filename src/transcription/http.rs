//! HTTP client for a remote transcription service.
//!
//! Request: `POST {endpoint}` with JSON `{"audio_locator": "..."}` and an
//! optional bearer token. A 2xx response carries `{"text": "...",
//! "language": "..."}`; anything else is a [`TranscriptionError`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::TranscriptionError;

use super::{Transcriber, Transcript};

/// Connect timeout for the transcription service. The request itself is not
/// bounded here; the worker pool owns the optional end-to-end deadline.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    audio_locator: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: String,
}

/// Transcriber backed by a remote HTTP service.
#[derive(Debug, Clone)]
pub struct HttpTranscriber {
    endpoint: String,
    api_key: Option<String>,
    http_client: Client,
}

impl HttpTranscriber {
    /// Create a client for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `TranscriptionError::RequestFailed` if the HTTP client cannot
    /// be built (e.g. TLS backend initialization failure).
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, TranscriptionError> {
        let http_client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| TranscriptionError::RequestFailed(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Check if an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Maps a non-success response to the most specific error.
fn error_for_status(status: StatusCode, body: &str, audio_locator: &str) -> TranscriptionError {
    if status == StatusCode::NOT_FOUND {
        return TranscriptionError::AudioNotFound(audio_locator.to_string());
    }

    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.trim().to_string());

    TranscriptionError::ServiceError {
        code: status.as_u16(),
        message,
    }
}

/// Converts a decoded success body into a transcript, rejecting blank text.
fn transcript_from_response(response: ApiResponse) -> Result<Transcript, TranscriptionError> {
    let transcript = Transcript {
        text: response.text,
        language: response.language,
    };
    if transcript.is_blank() {
        return Err(TranscriptionError::EmptyTranscript);
    }
    Ok(transcript)
}

#[async_trait]
impl Transcriber for HttpTranscriber {
    async fn transcribe(&self, audio_locator: &str) -> Result<Transcript, TranscriptionError> {
        let mut request = self
            .http_client
            .post(&self.endpoint)
            .json(&ApiRequest { audio_locator });

        if let Some(ref api_key) = self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranscriptionError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TranscriptionError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(error_for_status(status, &body, audio_locator));
        }

        let parsed: ApiResponse = serde_json::from_str(&body)
            .map_err(|e| TranscriptionError::ParseError(e.to_string()))?;

        tracing::debug!(
            audio_locator = audio_locator,
            chars = parsed.text.len(),
            "Transcription service responded"
        );

        transcript_from_response(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_construction() {
        let client = HttpTranscriber::new("http://localhost:9000/transcribe", None)
            .expect("client should build");
        assert_eq!(client.endpoint(), "http://localhost:9000/transcribe");
        assert!(!client.has_api_key());
    }

    #[test]
    fn test_not_found_maps_to_audio_not_found() {
        let err = error_for_status(StatusCode::NOT_FOUND, "", "uploads/gone.wav");
        match err {
            TranscriptionError::AudioNotFound(locator) => assert_eq!(locator, "uploads/gone.wav"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_structured_error_body() {
        let err = error_for_status(
            StatusCode::SERVICE_UNAVAILABLE,
            r#"{"error": "model loading"}"#,
            "k",
        );
        match err {
            TranscriptionError::ServiceError { code, message } => {
                assert_eq!(code, 503);
                assert_eq!(message, "model loading");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_plain_error_body() {
        let err = error_for_status(StatusCode::BAD_GATEWAY, "upstream down\n", "k");
        assert!(err.to_string().contains("upstream down"));
    }

    #[test]
    fn test_response_parsing() {
        let parsed: ApiResponse =
            serde_json::from_str(r#"{"text": "welcome everyone", "language": "en"}"#)
                .expect("valid body");
        let transcript = transcript_from_response(parsed).expect("non-empty");
        assert_eq!(transcript.text, "welcome everyone");
        assert_eq!(transcript.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_blank_response_is_an_error() {
        let parsed: ApiResponse = serde_json::from_str(r#"{"text": "   "}"#).expect("valid body");
        assert!(matches!(
            transcript_from_response(parsed),
            Err(TranscriptionError::EmptyTranscript)
        ));
    }
}
