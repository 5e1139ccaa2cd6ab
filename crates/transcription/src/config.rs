//! Tunables for the streaming manager (C4) and audio recorder (C5).
//! Constructed from `scribeline_config::Settings` at startup; kept as a
//! standalone struct here so the transcription crate stays independent of
//! the config crate's env-loading machinery.

use serde::{Deserialize, Serialize};

use crate::buffer::{DEFAULT_SLIDE_MS, DEFAULT_WINDOW_MS, SAMPLE_RATE_HZ};
use crate::vad::VadModelPaths;

/// C4 tunables (spec §4.4). Defaults match
/// `examples/original_source/backend/app/services/audio/manager.py`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    pub window_duration_ms: u64,
    pub slide_duration_ms: u64,
    pub sample_rate_hz: u32,
    pub silence_threshold_ms: f64,
    pub punctuation_min_duration_ms: f64,
    pub max_buffer_duration_ms: f64,
    pub min_transcription_interval_secs: f64,
    pub max_in_flight_transcriptions: usize,
    pub vad_model_paths: VadModelPaths,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            window_duration_ms: DEFAULT_WINDOW_MS,
            slide_duration_ms: DEFAULT_SLIDE_MS,
            sample_rate_hz: SAMPLE_RATE_HZ,
            silence_threshold_ms: 1_000.0,
            punctuation_min_duration_ms: 2_000.0,
            max_buffer_duration_ms: 6_000.0,
            min_transcription_interval_secs: 3.0,
            max_in_flight_transcriptions: 2,
            vad_model_paths: VadModelPaths::default(),
        }
    }
}

/// C5 tunables (spec §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Default chunk size: 30s @ 16kHz mono 16-bit PCM = 960,000 bytes.
    pub chunk_duration_secs: u64,
    pub bytes_per_second: u64,
    pub staging_dir: String,
}

impl RecorderConfig {
    pub fn chunk_size_bytes(&self) -> usize {
        (self.chunk_duration_secs * self.bytes_per_second) as usize
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            chunk_duration_secs: 30,
            bytes_per_second: 32_000,
            staging_dir: "./data/recordings".to_string(),
        }
    }
}
