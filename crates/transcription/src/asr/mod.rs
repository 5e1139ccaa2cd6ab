//! Transcription-backend client (spec §6 "Transcription backend"), used by
//! C4 for rolling-window calls and by C7 for the full-meeting reference
//! transcript.

pub mod http_backend;

pub use http_backend::HttpAsrBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A request to transcribe a WAV-wrapped audio window.
pub struct AsrRequest {
    pub wav_bytes: Vec<u8>,
    pub language_hint: Option<String>,
    /// Bounded suffix of previously-finalized text, used as a context
    /// prompt (spec §4.4 step 8).
    pub prompt_context: Option<String>,
    pub return_verbose: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub text: String,
    pub language_detected: Option<String>,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullTranscription {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
}

/// Tagged error variants (spec Design Notes §9 "Per-backend error
/// mapping") so callers never inspect error-message substrings.
#[derive(Debug, thiserror::Error)]
pub enum AsrError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    #[error("rate limited")]
    RateLimited,
    #[error("invalid or missing credential")]
    InvalidCredential,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("other transcription error: {0}")]
    Other(String),
}

#[async_trait]
pub trait AsrBackend: Send + Sync + 'static {
    async fn transcribe(&self, request: AsrRequest) -> Result<TranscriptionResult, AsrError>;

    async fn transcribe_full(&self, wav_bytes: Vec<u8>) -> Result<FullTranscription, AsrError>;

    fn name(&self) -> &str;
}
