//! C4 — streaming transcription manager: orchestrates VAD → rolling buffer
//! → transcription-backend calls, with aggressive duplicate suppression
//! over overlapping windows (spec §4.4). Grounded on
//! `examples/original_source/backend/app/services/audio/manager.py`'s
//! `StreamingTranscriptionManager`; thresholds and trigger priority are
//! taken verbatim from that module.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use md5::{Digest, Md5};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::asr::{AsrBackend, AsrError, AsrRequest};
use crate::buffer::RollingBuffer;
use crate::vad::VadBackend;
use crate::wav::pcm_to_wav;

/// 1.0s silence with a non-empty partial finalizes the current segment.
const SILENCE_THRESHOLD_MS: f64 = 1_000.0;
/// Punctuation finalizes once the current speech run has lasted this long.
const PUNCTUATION_MIN_DURATION_MS: f64 = 2_000.0;
/// Speech running longer than this always finalizes (`timeout`).
const MAX_BUFFER_DURATION_MS: f64 = 6_000.0;
/// Minimum wall-clock spacing between backend calls (also rate-limit guard).
const MIN_TRANSCRIPTION_INTERVAL: Duration = Duration::from_millis(3_000);
/// Bytes/sec for 16 kHz mono 16-bit PCM.
const BYTES_PER_SECOND: f64 = 32_000.0;
/// At most this many backend calls in flight at once (spec §4.4, §5).
const MAX_IN_FLIGHT_TRANSCRIPTIONS: usize = 2;

const SENTENCE_ENDINGS: &[char] = &['.', '!', '?', '。', '？', '！', '।'];

/// Fixed deny-list of common Whisper artifacts (spec §4.4 step 2),
/// grounded verbatim on `manager.py::_is_hallucination`.
const HALLUCINATION_DENYLIST: &[&str] = &[
    "you",
    "thank you.",
    "thanks for watching",
    "watching",
    "subtitles by",
    "amara.org",
    "mbc",
    "foreign",
    "foreign.",
    "so machen wir government",
    "so machen wir",
    "sous-titrage",
    "copyright",
    "all rights reserved",
];

/// The cause of a `FinalSegment` emission (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Silence,
    Punctuation,
    Timeout,
    Stability,
    SentenceComplete,
    Flush,
}

impl TriggerReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerReason::Silence => "silence",
            TriggerReason::Punctuation => "punctuation",
            TriggerReason::Timeout => "timeout",
            TriggerReason::Stability => "stability",
            TriggerReason::SentenceComplete => "sentence_complete",
            TriggerReason::Flush => "flush",
        }
    }
}

/// A finalized transcript fragment (spec §3 `FinalSegment`).
#[derive(Debug, Clone)]
pub struct FinalSegment {
    pub text: String,
    pub confidence: f64,
    pub reason: TriggerReason,
    pub audio_start_time: f64,
    pub audio_end_time: f64,
    pub duration: f64,
    pub original_text: Option<String>,
    pub translated: Option<bool>,
}

/// Output events produced while processing one audio frame (spec Design
/// Notes §9 "Asynchronous callbacks from the manager" — re-architected as
/// an explicit event vector rather than callbacks).
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    Final(FinalSegment),
    Error { code: ManagerErrorCode, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerErrorCode {
    GroqKeyRequired,
    GroqRateLimit,
}

/// Per-session state for the streaming transcription manager (spec §4.4).
pub struct StreamingTranscriptionManager {
    asr: Arc<dyn AsrBackend>,
    buffer: RollingBuffer,
    vad: VadBackend,
    call_permits: Arc<Semaphore>,

    last_partial: String,
    last_final_concatenated: String,
    same_text_count: u32,
    silence_ms: f64,
    is_speaking: bool,

    finalized_hashes: HashSet<String>,

    session_start: Instant,
    last_chunk_timestamp: f64,
    speech_start_time: f64,
    speech_end_time: f64,
    last_speech_wallclock: Instant,
    last_transcription_wallclock: Option<Instant>,
}

impl StreamingTranscriptionManager {
    pub fn new(asr: Arc<dyn AsrBackend>, buffer: RollingBuffer, vad: VadBackend) -> Self {
        let now = Instant::now();
        Self {
            asr,
            buffer,
            vad,
            call_permits: Arc::new(Semaphore::new(MAX_IN_FLIGHT_TRANSCRIPTIONS)),
            last_partial: String::new(),
            last_final_concatenated: String::new(),
            same_text_count: 0,
            silence_ms: 0.0,
            is_speaking: false,
            finalized_hashes: HashSet::new(),
            session_start: now,
            last_chunk_timestamp: 0.0,
            speech_start_time: 0.0,
            speech_end_time: 0.0,
            last_speech_wallclock: now,
            last_transcription_wallclock: None,
        }
    }

    /// Processes one inbound audio frame (spec §4.4 "Processing a frame").
    /// `client_timestamp` is seconds since session start; `None` falls back
    /// to server wall clock.
    pub async fn process_frame(
        &mut self,
        pcm_bytes: &[u8],
        client_timestamp: Option<f64>,
    ) -> Vec<ManagerEvent> {
        let mut events = Vec::new();

        let timestamp = match client_timestamp {
            Some(mut ts) => {
                if ts < self.last_chunk_timestamp {
                    warn!(
                        ts,
                        last = self.last_chunk_timestamp,
                        "non-monotonic client timestamp, clamping"
                    );
                    ts = self.last_chunk_timestamp + 0.1;
                }
                ts
            }
            None => self.session_start.elapsed().as_secs_f64(),
        };
        self.last_chunk_timestamp = timestamp;

        let chunk_duration = pcm_bytes.len() as f64 / BYTES_PER_SECOND;
        let current_end_time = timestamp + chunk_duration;

        let samples = bytes_to_i16(pcm_bytes);
        let is_speech = self.vad.is_speech(&samples);

        // Always append — preserves time continuity across silent intervals.
        self.buffer.add_samples(&samples);

        if is_speech {
            self.last_speech_wallclock = Instant::now();
            if !self.is_speaking {
                self.is_speaking = true;
                self.speech_start_time = timestamp;
                debug!(timestamp, "speech started");
            }
            self.speech_end_time = current_end_time;
            self.silence_ms = 0.0;
        } else if self.is_speaking {
            self.silence_ms += chunk_duration * 1000.0;

            if self.silence_ms > SILENCE_THRESHOLD_MS && !self.last_partial.is_empty() {
                let hash = normalized_hash(&self.last_partial);
                if !self.finalized_hashes.contains(&hash) {
                    let segment = FinalSegment {
                        text: self.last_partial.clone(),
                        confidence: 1.0,
                        reason: TriggerReason::Silence,
                        audio_start_time: self.speech_start_time,
                        audio_end_time: self.speech_end_time,
                        duration: self.speech_end_time - self.speech_start_time,
                        original_text: None,
                        translated: None,
                    };
                    info!(reason = "silence", "final segment emitted");
                    self.finalized_hashes.insert(hash);
                    self.last_final_concatenated
                        .push_str(&format!(" {}", segment.text));
                    events.push(ManagerEvent::Final(segment));
                } else {
                    debug!("skipping duplicate (silence trigger)");
                }
                self.last_partial.clear();
                self.same_text_count = 0;
                self.is_speaking = false;
                self.speech_start_time = 0.0;
            }
        }

        // Decide whether to call the backend.
        let now = Instant::now();
        let time_since_last = self
            .last_transcription_wallclock
            .map(|t| now.duration_since(t))
            .unwrap_or(MIN_TRANSCRIPTION_INTERVAL);
        let window_duration_ms =
            (self.buffer.window_size() as f64 / crate::buffer::SAMPLE_RATE_HZ as f64) * 1000.0;
        let has_recent_speech =
            now.duration_since(self.last_speech_wallclock) < Duration::from_millis(window_duration_ms as u64);

        if self.buffer.is_viable() && time_since_last >= MIN_TRANSCRIPTION_INTERVAL {
            if has_recent_speech {
                self.last_transcription_wallclock = Some(now);
                self.call_backend(&mut events).await;
            } else {
                // Buffer full but it's silence — advance the clock to avoid spinning.
                self.last_transcription_wallclock = Some(now);
            }
        }

        events
    }

    async fn call_backend(&mut self, events: &mut Vec<ManagerEvent>) {
        let _permit = match self.call_permits.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                debug!("all transcription worker-pool slots busy, skipping this trigger");
                return;
            }
        };

        let window_bytes = self.buffer.get_window_bytes();
        let wav_bytes = match pcm_to_wav(&window_bytes, crate::wav::SAMPLE_RATE_HZ) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "failed to encode window as wav");
                return;
            }
        };

        let prompt_context = if self.last_final_concatenated.is_empty() {
            None
        } else {
            Some(tail_chars(&self.last_final_concatenated, 100))
        };

        let request = AsrRequest {
            wav_bytes,
            language_hint: None,
            prompt_context,
            return_verbose: false,
        };

        match self.asr.transcribe(request).await {
            Ok(result) => {
                if !result.text.is_empty() {
                    let final_events = self.handle_transcript(
                        result.text,
                        result.confidence,
                        result.original_text,
                        result.translated,
                    );
                    events.extend(final_events);
                }
            }
            Err(AsrError::RateLimited) => {
                events.push(ManagerEvent::Error {
                    code: ManagerErrorCode::GroqRateLimit,
                    message: "transcription backend rate limit reached".to_string(),
                });
            }
            Err(AsrError::InvalidCredential) => {
                events.push(ManagerEvent::Error {
                    code: ManagerErrorCode::GroqKeyRequired,
                    message: "transcription backend credential missing or invalid".to_string(),
                });
            }
            Err(e) => {
                warn!(error = %e, "transcription backend call failed, skipping this window");
            }
        }
    }

    /// `handleTranscript` (spec §4.4): hallucination filter, overlap
    /// removal, exact/near-duplicate suppression, stability tracking, and
    /// the four finalize triggers in priority order.
    fn handle_transcript(
        &mut self,
        text: String,
        confidence: f64,
        original_text: Option<String>,
        translated: Option<bool>,
    ) -> Vec<ManagerEvent> {
        let mut events = Vec::new();
        let text = text.trim().to_string();

        if text.chars().count() < 2 {
            return events;
        }
        if is_hallucination(&text) {
            debug!(%text, "filtered hallucination");
            return events;
        }

        let text = self.remove_overlap(&text);
        if text.trim().chars().count() < 3 {
            debug!("dropped - fully overlapping with prior final text");
            return events;
        }

        let hash = normalized_hash(&text);
        if self.finalized_hashes.contains(&hash) {
            debug!("dropped - exact duplicate hash");
            return events;
        }

        if self.is_near_duplicate(&text) {
            debug!("dropped - near-duplicate n-gram overlap");
            return events;
        }

        if text == self.last_partial {
            self.same_text_count += 1;
        } else {
            self.same_text_count = 0;
            self.last_partial = text.clone();
        }

        let is_complete_sentence = ends_with_sentence_terminal(&text);
        let speech_duration_ms = if self.speech_start_time > 0.0 {
            (self.speech_end_time - self.speech_start_time) * 1000.0
        } else {
            0.0
        };

        let trigger = if is_complete_sentence && speech_duration_ms >= PUNCTUATION_MIN_DURATION_MS {
            Some(TriggerReason::Punctuation)
        } else if speech_duration_ms >= MAX_BUFFER_DURATION_MS {
            Some(TriggerReason::Timeout)
        } else if self.same_text_count >= 4 {
            Some(TriggerReason::Stability)
        } else if self.same_text_count >= 2 && is_complete_sentence {
            Some(TriggerReason::SentenceComplete)
        } else {
            None
        };

        if let Some(reason) = trigger {
            if self.finalized_hashes.contains(&hash) {
                return events;
            }

            let segment = FinalSegment {
                text: text.clone(),
                confidence,
                reason,
                audio_start_time: self.speech_start_time,
                audio_end_time: self.speech_end_time,
                duration: self.speech_end_time - self.speech_start_time,
                original_text,
                translated,
            };
            info!(reason = reason.as_str(), "final segment emitted");

            self.finalized_hashes.insert(hash);
            self.last_final_concatenated.push_str(&format!(" {}", text));
            self.last_partial.clear();
            self.same_text_count = 0;
            // Advance so the next segment starts contiguous.
            self.speech_start_time = self.speech_end_time;

            events.push(ManagerEvent::Final(segment));
        }

        events
    }

    /// Strips the largest overlapping word-run from the head of `new_text`
    /// against the tail of `last_final_concatenated` (spec §4.4 step 3).
    fn remove_overlap(&self, new_text: &str) -> String {
        if self.last_final_concatenated.trim().is_empty() {
            return new_text.to_string();
        }

        let final_words: Vec<&str> = self.last_final_concatenated.split_whitespace().collect();
        let new_words: Vec<&str> = new_text.split_whitespace().collect();

        if new_words.len() < 4 {
            return new_text.to_string();
        }

        let max_overlap_check = (new_words.len() / 2 + 5).min(20);
        let search_window = final_words.len().min(50);
        let tail = &final_words[final_words.len() - search_window..];

        let mut best_overlap = 0usize;
        for overlap_size in (3..=max_overlap_check).rev() {
            let new_head = &new_words[..overlap_size];

            let mut found = false;
            let slide_limit = search_window.min(15);
            for start in 0..slide_limit {
                if start + overlap_size > search_window {
                    break;
                }
                let segment = &tail[start..start + overlap_size];
                if jaccard(new_head, segment) >= 0.5 {
                    found = true;
                    break;
                }
            }
            if !found && overlap_size <= search_window {
                let end_segment = &tail[search_window - overlap_size..];
                if jaccard(new_head, end_segment) >= 0.5 {
                    found = true;
                }
            }

            if found {
                best_overlap = overlap_size;
                break;
            }
        }

        if best_overlap > 0 {
            debug!(best_overlap, "removed overlapping words (fuzzy match)");
            new_words[best_overlap..].join(" ")
        } else {
            new_text.to_string()
        }
    }

    /// 3-gram overlap check against the recent finalized tail (spec §4.4
    /// step 5).
    fn is_near_duplicate(&self, text: &str) -> bool {
        if self.last_final_concatenated.trim().is_empty() || text.split_whitespace().count() < 5 {
            return false;
        }

        let new_ngrams = ngrams(text, 3);
        if new_ngrams.is_empty() {
            return false;
        }

        let final_words: Vec<&str> = self.last_final_concatenated.split_whitespace().collect();
        let recent: String = if final_words.len() > 100 {
            final_words[final_words.len() - 100..].join(" ")
        } else {
            self.last_final_concatenated.clone()
        };
        let final_ngrams = ngrams(&recent, 3);
        if final_ngrams.is_empty() {
            return false;
        }

        let overlap = new_ngrams.intersection(&final_ngrams).count();
        let ratio = overlap as f64 / new_ngrams.len() as f64;
        ratio >= 0.35
    }

    /// `forceFlush` (spec §4.4): synchronously transcribes whatever remains
    /// in the buffer and returns it as a `flush`-reason segment. Never
    /// throws; backend errors are logged and `None` is returned.
    pub async fn force_flush(&mut self) -> Option<FinalSegment> {
        let remaining = self.buffer.get_all_samples_bytes();
        // 0.5s @ 16kHz mono 16-bit = 16000 bytes.
        if remaining.len() <= 16_000 {
            return None;
        }

        info!(bytes = remaining.len(), "force flush: transcribing remaining buffer");
        let wav_bytes = match pcm_to_wav(&remaining, crate::wav::SAMPLE_RATE_HZ) {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "force flush: failed to encode wav");
                return None;
            }
        };

        let prompt_context = if self.last_final_concatenated.is_empty() {
            None
        } else {
            Some(tail_chars(&self.last_final_concatenated, 100))
        };

        let request = AsrRequest {
            wav_bytes,
            language_hint: None,
            prompt_context,
            return_verbose: false,
        };

        match self.asr.transcribe(request).await {
            Ok(result) if !result.text.trim().is_empty() => {
                let duration = self.buffer.get_buffer_duration_ms() / 1000.0;
                Some(FinalSegment {
                    text: result.text,
                    confidence: result.confidence,
                    reason: TriggerReason::Flush,
                    audio_start_time: self.speech_start_time,
                    audio_end_time: self.speech_start_time + duration,
                    duration,
                    original_text: result.original_text,
                    translated: result.translated,
                })
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "force flush: backend call failed");
                None
            }
        }
    }

    /// Clears buffer, text state, counters, and both dedup sets (spec
    /// §4.4 `reset`).
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_partial.clear();
        self.last_final_concatenated.clear();
        self.same_text_count = 0;
        self.silence_ms = 0.0;
        self.is_speaking = false;
        self.finalized_hashes.clear();
        info!("manager state reset");
    }
}

fn bytes_to_i16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect()
}

/// Lowercase, collapsed-whitespace, first-16-hex-chars-of-MD5 (spec §4.4
/// step 4).
fn normalized_hash(text: &str) -> String {
    let normalized = text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    let digest = Md5::digest(normalized.as_bytes());
    hex::encode(digest)[..16].to_string()
}

fn ends_with_sentence_terminal(text: &str) -> bool {
    text.trim().ends_with(SENTENCE_ENDINGS)
}

fn is_hallucination(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    if HALLUCINATION_DENYLIST.contains(&lower.as_str()) {
        return true;
    }
    lower.contains("so machen wir") || lower.contains("government gestolken")
}

fn jaccard(a: &[&str], b: &[&str]) -> f64 {
    let set_a: HashSet<String> = a.iter().map(|w| w.to_lowercase()).collect();
    let set_b: HashSet<String> = b.iter().map(|w| w.to_lowercase()).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

fn ngrams(text: &str, n: usize) -> HashSet<String> {
    let words: Vec<String> = text.to_lowercase().split_whitespace().map(String::from).collect();
    if words.len() < n {
        return if words.is_empty() {
            HashSet::new()
        } else {
            HashSet::from([words.join(" ")])
        };
    }
    (0..=words.len() - n).map(|i| words[i..i + n].join(" ")).collect()
}

fn tail_chars(text: &str, n: usize) -> String {
    let trimmed = text.trim();
    let char_count = trimmed.chars().count();
    if char_count <= n {
        trimmed.to_string()
    } else {
        trimmed.chars().skip(char_count - n).collect()
    }
}
