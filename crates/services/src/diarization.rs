//! C7 — sends merged meeting audio to a cloud speaker-diarization
//! provider and reduces its response to a speaker timeline. Grounded on
//! `examples/original_source/backend/app/services/audio/diarization.py`'s
//! `DiarizationService`.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use scribeline_transcription::{AsrBackend, FullTranscription};
use serde::Deserialize;
use thiserror::Error;

const MAX_RETRIES: u32 = 3;
const SAME_SPEAKER_MERGE_GAP_SECS: f64 = 5.0;

#[derive(Debug, Error)]
pub enum DiarizationError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    #[error("rate limited")]
    RateLimited,
    #[error("invalid or missing credential")]
    InvalidCredential,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("other diarization error: {0}")]
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerSegment {
    pub speaker: String,
    pub start_time: f64,
    pub end_time: f64,
    pub text: String,
    pub confidence: f64,
    pub word_count: usize,
}

#[derive(Debug, Clone)]
pub struct DiarizationResult {
    pub segments: Vec<SpeakerSegment>,
    pub speaker_count: usize,
    pub provider: &'static str,
}

#[derive(Debug, Clone)]
struct RawWord {
    speaker: String,
    start: f64,
    end: f64,
    text: String,
    confidence: f64,
}

fn merge_same_speaker(mut words: Vec<RawWord>) -> Vec<SpeakerSegment> {
    words.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));

    let mut segments: Vec<SpeakerSegment> = Vec::new();
    for word in words {
        if let Some(last) = segments.last_mut() {
            let gap = word.start - last.end_time;
            if last.speaker == word.speaker && gap <= SAME_SPEAKER_MERGE_GAP_SECS {
                last.end_time = word.end;
                last.text.push(' ');
                last.text.push_str(&word.text);
                last.word_count += 1;
                last.confidence = (last.confidence * (last.word_count - 1) as f64 + word.confidence)
                    / last.word_count as f64;
                continue;
            }
        }
        segments.push(SpeakerSegment {
            speaker: word.speaker,
            start_time: word.start,
            end_time: word.end,
            text: word.text,
            confidence: word.confidence,
            word_count: 1,
        });
    }
    segments
}

/// Exponential backoff (1s, 2s, 4s) across up to `MAX_RETRIES` attempts;
/// never retries a 4xx (spec §4.7 step "retry policy").
async fn with_retry<F, Fut, T>(mut attempt: F) -> Result<T, DiarizationError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, DiarizationError>>,
{
    let mut delay = Duration::from_secs(1);
    for try_num in 1..=MAX_RETRIES {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(e @ DiarizationError::BadRequest(_)) | Err(e @ DiarizationError::InvalidCredential) => {
                return Err(e);
            }
            Err(e) if try_num == MAX_RETRIES => return Err(e),
            Err(e) => {
                tracing::warn!(attempt = try_num, error = %e, "diarization request failed, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
    unreachable!()
}

/// Sniffs the audio container from its leading magic bytes rather than
/// assuming WAV; the recorder always produces WAV but `diarize` is also
/// reachable with externally-sourced reference audio (spec §4.7).
fn sniff_content_type(audio_bytes: &[u8]) -> &'static str {
    if audio_bytes.len() >= 12 && &audio_bytes[0..4] == b"RIFF" && &audio_bytes[8..12] == b"WAVE" {
        "audio/wav"
    } else if audio_bytes.starts_with(b"OggS") {
        "audio/ogg"
    } else if audio_bytes.starts_with(b"ID3")
        || (audio_bytes.len() >= 2 && audio_bytes[0] == 0xff && (audio_bytes[1] & 0xe0) == 0xe0)
    {
        "audio/mpeg"
    } else {
        "audio/wav"
    }
}

fn classify_status(status: StatusCode, body: &str) -> DiarizationError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        DiarizationError::InvalidCredential
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        DiarizationError::RateLimited
    } else if status.is_client_error() {
        DiarizationError::BadRequest(body.to_string())
    } else {
        DiarizationError::TransientNetwork(format!("status {status}"))
    }
}

/// Deepgram-style single-request provider ("Provider-D"): one POST with
/// the audio body, response carries utterances directly.
pub struct DeepgramProvider {
    client: Client,
    api_key: String,
    api_url: String,
}

impl DeepgramProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_url(api_key, "https://api.deepgram.com/v1/listen".to_string())
    }

    pub fn with_url(api_key: String, api_url: String) -> Self {
        let client = Client::builder()
            .local_address(Some(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)))
            .timeout(Duration::from_secs(300))
            .build()
            .expect("reqwest client builds");
        Self { client, api_key, api_url }
    }

    async fn diarize_once(&self, audio_bytes: &[u8]) -> Result<Vec<RawWord>, DiarizationError> {
        let response = self
            .client
            .post(format!(
                "{}?model=nova-2&diarize=true&punctuate=true&utterances=true",
                self.api_url
            ))
            .header("Authorization", format!("Token {}", self.api_key))
            .header("Content-Type", sniff_content_type(audio_bytes))
            .body(audio_bytes.to_vec())
            .send()
            .await
            .map_err(|e| DiarizationError::TransientNetwork(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DiarizationError::TransientNetwork(e.to_string()))?;

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: DeepgramResponse =
            serde_json::from_str(&body).map_err(|e| DiarizationError::Other(e.to_string()))?;

        Ok(parse_deepgram(parsed))
    }
}

#[derive(Debug, Deserialize)]
struct DeepgramResponse {
    results: DeepgramResults,
}

#[derive(Debug, Deserialize)]
struct DeepgramResults {
    #[serde(default)]
    utterances: Vec<DeepgramUtterance>,
    channels: Vec<DeepgramChannel>,
}

#[derive(Debug, Deserialize)]
struct DeepgramUtterance {
    speaker: u32,
    start: f64,
    end: f64,
    transcript: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct DeepgramChannel {
    alternatives: Vec<DeepgramAlternative>,
}

#[derive(Debug, Deserialize)]
struct DeepgramAlternative {
    #[serde(default)]
    words: Vec<DeepgramWord>,
}

#[derive(Debug, Deserialize)]
struct DeepgramWord {
    word: String,
    start: f64,
    end: f64,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    speaker: Option<u32>,
}

/// Prefers utterances (already speaker-grouped); falls back to
/// per-word reconstruction when a response carries words but no
/// utterances (spec §4.7 "utterance-preferred/word-reconstruction
/// fallback parsing").
fn parse_deepgram(response: DeepgramResponse) -> Vec<RawWord> {
    if !response.results.utterances.is_empty() {
        return response
            .results
            .utterances
            .into_iter()
            .map(|u| RawWord {
                speaker: format!("Speaker {}", u.speaker),
                start: u.start,
                end: u.end,
                text: u.transcript,
                confidence: u.confidence,
            })
            .collect();
    }

    response
        .results
        .channels
        .into_iter()
        .flat_map(|c| c.alternatives.into_iter())
        .flat_map(|a| a.words.into_iter())
        .map(|w| RawWord {
            speaker: format!("Speaker {}", w.speaker.unwrap_or(0)),
            start: w.start,
            end: w.end,
            text: w.word,
            confidence: w.confidence,
        })
        .collect()
}

/// AssemblyAI-style two-stage provider ("Provider-A"): submit then poll.
pub struct AssemblyAiProvider {
    client: Client,
    api_key: String,
    api_url: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl AssemblyAiProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_url(api_key, "https://api.assemblyai.com/v2".to_string())
    }

    pub fn with_url(api_key: String, api_url: String) -> Self {
        let client = Client::builder()
            .local_address(Some(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)))
            .timeout(Duration::from_secs(300))
            .build()
            .expect("reqwest client builds");
        Self {
            client,
            api_key,
            api_url,
            poll_interval: Duration::from_secs(3),
            max_polls: 200,
        }
    }

    async fn upload(&self, audio_bytes: &[u8]) -> Result<String, DiarizationError> {
        let response = self
            .client
            .post(format!("{}/upload", self.api_url))
            .header("authorization", &self.api_key)
            .body(audio_bytes.to_vec())
            .send()
            .await
            .map_err(|e| DiarizationError::TransientNetwork(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DiarizationError::TransientNetwork(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        #[derive(Deserialize)]
        struct UploadResponse {
            upload_url: String,
        }
        let parsed: UploadResponse =
            serde_json::from_str(&body).map_err(|e| DiarizationError::Other(e.to_string()))?;
        Ok(parsed.upload_url)
    }

    async fn submit(&self, upload_url: &str) -> Result<String, DiarizationError> {
        let response = self
            .client
            .post(format!("{}/transcript", self.api_url))
            .header("authorization", &self.api_key)
            .json(&serde_json::json!({ "audio_url": upload_url, "speaker_labels": true }))
            .send()
            .await
            .map_err(|e| DiarizationError::TransientNetwork(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DiarizationError::TransientNetwork(e.to_string()))?;
        if !status.is_success() {
            return Err(classify_status(status, &body));
        }
        #[derive(Deserialize)]
        struct SubmitResponse {
            id: String,
        }
        let parsed: SubmitResponse =
            serde_json::from_str(&body).map_err(|e| DiarizationError::Other(e.to_string()))?;
        Ok(parsed.id)
    }

    async fn poll(&self, job_id: &str) -> Result<Vec<RawWord>, DiarizationError> {
        for _ in 0..self.max_polls {
            let response = self
                .client
                .get(format!("{}/transcript/{}", self.api_url, job_id))
                .header("authorization", &self.api_key)
                .send()
                .await
                .map_err(|e| DiarizationError::TransientNetwork(e.to_string()))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| DiarizationError::TransientNetwork(e.to_string()))?;
            if !status.is_success() {
                return Err(classify_status(status, &body));
            }

            let parsed: AssemblyAiPollResponse =
                serde_json::from_str(&body).map_err(|e| DiarizationError::Other(e.to_string()))?;

            match parsed.status.as_str() {
                "completed" => {
                    return Ok(parsed
                        .utterances
                        .unwrap_or_default()
                        .into_iter()
                        .map(|u| RawWord {
                            speaker: format!("Speaker {}", u.speaker),
                            start: u.start as f64 / 1000.0,
                            end: u.end as f64 / 1000.0,
                            text: u.text,
                            confidence: u.confidence,
                        })
                        .collect())
                }
                "error" => {
                    return Err(DiarizationError::Other(
                        parsed.error.unwrap_or_else(|| "unknown provider error".to_string()),
                    ))
                }
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
        Err(DiarizationError::TransientNetwork("polling timed out".to_string()))
    }

    async fn diarize_once(&self, audio_bytes: &[u8]) -> Result<Vec<RawWord>, DiarizationError> {
        let upload_url = self.upload(audio_bytes).await?;
        let job_id = self.submit(&upload_url).await?;
        self.poll(&job_id).await
    }
}

#[derive(Debug, Deserialize)]
struct AssemblyAiPollResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    utterances: Option<Vec<AssemblyAiUtterance>>,
}

#[derive(Debug, Deserialize)]
struct AssemblyAiUtterance {
    speaker: String,
    start: i64,
    end: i64,
    text: String,
    confidence: f64,
}

enum Provider {
    Deepgram(DeepgramProvider),
    AssemblyAi(AssemblyAiProvider),
}

pub struct DiarizationService {
    provider: Provider,
    asr: Arc<dyn AsrBackend>,
}

impl DiarizationService {
    pub fn deepgram(api_key: String, asr: Arc<dyn AsrBackend>) -> Self {
        Self {
            provider: Provider::Deepgram(DeepgramProvider::new(api_key)),
            asr,
        }
    }

    pub fn assemblyai(api_key: String, asr: Arc<dyn AsrBackend>) -> Self {
        Self {
            provider: Provider::AssemblyAi(AssemblyAiProvider::new(api_key)),
            asr,
        }
    }

    /// Sends `audio_bytes` to the configured provider and reduces the
    /// response into a merged speaker timeline (spec §4.7 `diarize`).
    pub async fn diarize(&self, audio_bytes: &[u8]) -> Result<DiarizationResult, DiarizationError> {
        let (words, provider_name) = match &self.provider {
            Provider::Deepgram(p) => (with_retry(|| p.diarize_once(audio_bytes)).await?, "deepgram"),
            Provider::AssemblyAi(p) => (with_retry(|| p.diarize_once(audio_bytes)).await?, "assemblyai"),
        };

        let segments = merge_same_speaker(words);
        let speaker_count = segments
            .iter()
            .map(|s| s.speaker.as_str())
            .collect::<std::collections::HashSet<_>>()
            .len();

        Ok(DiarizationResult {
            segments,
            speaker_count,
            provider: provider_name,
        })
    }

    /// Produces a clean full-meeting reference transcript by reusing C4's
    /// ASR backend over the whole merged audio, independent of the
    /// rolling-window live transcript (spec §4.7 `transcribe_reference`).
    pub async fn transcribe_reference(
        &self,
        wav_bytes: Vec<u8>,
    ) -> Result<FullTranscription, scribeline_transcription::AsrError> {
        self.asr.transcribe_full(wav_bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word(speaker: &str, start: f64, end: f64, text: &str) -> RawWord {
        RawWord {
            speaker: speaker.to_string(),
            start,
            end,
            text: text.to_string(),
            confidence: 0.9,
        }
    }

    #[test]
    fn consecutive_same_speaker_words_merge_into_one_segment() {
        let words = vec![
            word("Speaker 0", 0.0, 1.0, "hello"),
            word("Speaker 0", 1.0, 2.0, "there"),
        ];
        let segments = merge_same_speaker(words);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "hello there");
        assert_eq!(segments[0].word_count, 2);
    }

    #[test]
    fn speaker_change_starts_a_new_segment() {
        let words = vec![word("Speaker 0", 0.0, 1.0, "hi"), word("Speaker 1", 1.0, 2.0, "hey")];
        let segments = merge_same_speaker(words);
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn gap_beyond_threshold_splits_same_speaker_segment() {
        let words = vec![word("Speaker 0", 0.0, 1.0, "hi"), word("Speaker 0", 10.0, 11.0, "again")];
        let segments = merge_same_speaker(words);
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn parse_deepgram_prefers_utterances_over_words() {
        let response = DeepgramResponse {
            results: DeepgramResults {
                utterances: vec![DeepgramUtterance {
                    speaker: 0,
                    start: 0.0,
                    end: 1.0,
                    transcript: "hi".to_string(),
                    confidence: 0.95,
                }],
                channels: vec![],
            },
        };
        let words = parse_deepgram(response);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].speaker, "Speaker 0");
    }

    #[test]
    fn sniff_content_type_detects_wav_mp3_and_ogg() {
        let mut wav = b"RIFF".to_vec();
        wav.extend_from_slice(&[0, 0, 0, 0]);
        wav.extend_from_slice(b"WAVE");
        assert_eq!(sniff_content_type(&wav), "audio/wav");

        assert_eq!(sniff_content_type(b"ID3\x03\x00\x00\x00"), "audio/mpeg");
        assert_eq!(sniff_content_type(&[0xff, 0xfb, 0x90, 0x00]), "audio/mpeg");
        assert_eq!(sniff_content_type(b"OggS\x00\x02"), "audio/ogg");
        assert_eq!(sniff_content_type(b"\x00\x00\x00\x00garbage"), "audio/wav");
    }

    #[test]
    fn parse_deepgram_falls_back_to_words_when_no_utterances() {
        let response = DeepgramResponse {
            results: DeepgramResults {
                utterances: vec![],
                channels: vec![DeepgramChannel {
                    alternatives: vec![DeepgramAlternative {
                        words: vec![DeepgramWord {
                            word: "hi".to_string(),
                            start: 0.0,
                            end: 0.5,
                            confidence: 0.9,
                            speaker: Some(1),
                        }],
                    }],
                }],
            },
        };
        let words = parse_deepgram(response);
        assert_eq!(words.len(), 1);
        assert_eq!(words[0].speaker, "Speaker 1");
    }
}
