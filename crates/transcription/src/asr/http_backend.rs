//! Whisper-API-style HTTP transcription backend: a multipart POST of WAV
//! bytes to an OpenAI-compatible `/audio/transcriptions` endpoint,
//! requesting `verbose_json` for per-segment timing and deterministic
//! (`temperature=0.0`) output. Grounded on the reference implementation's
//! Groq client (same request shape, same provider family) and on a
//! Whisper-API Rust client pattern (multipart upload, `reqwest`).

use async_trait::async_trait;
use serde::Deserialize;

use super::{AsrBackend, AsrError, AsrRequest, FullTranscription, TranscriptSegment, TranscriptionResult};

pub struct HttpAsrBackend {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl HttpAsrBackend {
    pub fn new(api_key: String, api_url: Option<String>, model: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            api_url: api_url
                .unwrap_or_else(|| "https://api.groq.com/openai/v1/audio/transcriptions".to_string()),
            model: model.unwrap_or_else(|| "whisper-large-v3".to_string()),
        }
    }

    async fn post(
        &self,
        wav_bytes: Vec<u8>,
        language: Option<&str>,
        prompt: Option<&str>,
    ) -> Result<VerboseResponse, AsrError> {
        let part = reqwest::multipart::Part::bytes(wav_bytes)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| AsrError::Other(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("temperature", "0.0");

        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }
        if let Some(p) = prompt {
            form = form.text("prompt", p.to_string());
        }

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    AsrError::TransientNetwork(e.to_string())
                } else {
                    AsrError::Other(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => AsrError::InvalidCredential,
                429 => AsrError::RateLimited,
                400..=499 => AsrError::BadRequest(body),
                _ => AsrError::TransientNetwork(body),
            });
        }

        response
            .json::<VerboseResponse>()
            .await
            .map_err(|e| AsrError::Other(e.to_string()))
    }
}

#[async_trait]
impl AsrBackend for HttpAsrBackend {
    async fn transcribe(&self, request: AsrRequest) -> Result<TranscriptionResult, AsrError> {
        let prompt = request.prompt_context.as_deref();
        let resp = self
            .post(request.wav_bytes, request.language_hint.as_deref(), prompt)
            .await?;

        Ok(TranscriptionResult {
            text: resp.text.trim().to_string(),
            language_detected: resp.language,
            duration: resp.duration.unwrap_or(0.0),
            translated: None,
            original_text: None,
            confidence: 1.0,
        })
    }

    async fn transcribe_full(&self, wav_bytes: Vec<u8>) -> Result<FullTranscription, AsrError> {
        let resp = self.post(wav_bytes, None, None).await?;
        let segments = resp
            .segments
            .unwrap_or_default()
            .into_iter()
            .map(|s| TranscriptSegment {
                start: s.start,
                end: s.end,
                text: s.text.trim().to_string(),
            })
            .collect();

        Ok(FullTranscription {
            text: resp.text.trim().to_string(),
            segments,
        })
    }

    fn name(&self) -> &str {
        "http_asr"
    }
}

#[derive(Debug, Deserialize)]
struct VerboseResponse {
    text: String,
    language: Option<String>,
    duration: Option<f64>,
    segments: Option<Vec<VerboseSegment>>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    start: f64,
    end: f64,
    text: String,
}
