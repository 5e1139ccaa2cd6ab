//! C2 — voice activity detection. A small variant type over the shared
//! {`is_speech`, `get_speech_segments`} capability set (spec Design Notes
//! §9 "Dynamic dispatch over VAD backends"); callers never branch on which
//! backend got selected.

mod amplitude;
#[cfg(feature = "vad")]
mod onnx;

pub use amplitude::AmplitudeVad;
#[cfg(feature = "vad")]
pub use onnx::OnnxVad;

use crate::buffer::SAMPLE_RATE_HZ;

pub const NATIVE_FRAME_SIZE: usize = 256;
pub const ML_FRAME_SIZE: usize = 512;
pub const ML_THRESHOLD: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeechSegment {
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Paths to on-disk models for the two non-amplitude tiers. Either or both
/// may be absent, in which case construction falls through to the next
/// tier, exactly as spec §4.2 prescribes.
#[derive(Debug, Clone, Default)]
pub struct VadModelPaths {
    pub native_model_path: Option<String>,
    pub ml_model_path: Option<String>,
}

pub enum VadBackend {
    #[cfg(feature = "vad")]
    Native(OnnxVad),
    #[cfg(feature = "vad")]
    Ml(OnnxVad),
    Amplitude(AmplitudeVad),
}

impl VadBackend {
    /// Attempts native, then ML, then falls back to amplitude. Never fails:
    /// the amplitude tier always succeeds, so this returns `Self` directly
    /// rather than a `Result`.
    pub fn construct(paths: &VadModelPaths) -> Self {
        #[cfg(feature = "vad")]
        {
            if let Some(path) = &paths.native_model_path {
                match OnnxVad::load(path, NATIVE_FRAME_SIZE, ML_THRESHOLD) {
                    Ok(vad) => {
                        tracing::info!(backend = "native", "VAD backend selected");
                        return VadBackend::Native(vad);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "native VAD failed to load, trying ML backend");
                    }
                }
            }

            if let Some(path) = &paths.ml_model_path {
                match OnnxVad::load(path, ML_FRAME_SIZE, ML_THRESHOLD) {
                    Ok(vad) => {
                        tracing::info!(backend = "ml", "VAD backend selected");
                        return VadBackend::Ml(vad);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "ML VAD failed to load, falling back to amplitude");
                    }
                }
            }
        }

        tracing::info!(backend = "amplitude", "VAD backend selected");
        VadBackend::Amplitude(AmplitudeVad::new(amplitude::DEFAULT_THRESHOLD, SAMPLE_RATE_HZ))
    }

    pub fn is_speech(&self, frame: &[i16]) -> bool {
        match self {
            #[cfg(feature = "vad")]
            VadBackend::Native(v) => v.is_speech(frame),
            #[cfg(feature = "vad")]
            VadBackend::Ml(v) => v.is_speech(frame),
            VadBackend::Amplitude(v) => v.is_speech(frame),
        }
    }

    pub fn get_speech_segments(
        &self,
        audio: &[i16],
        min_speech_duration_ms: u64,
        min_silence_duration_ms: u64,
    ) -> Vec<SpeechSegment> {
        match self {
            #[cfg(feature = "vad")]
            VadBackend::Native(v) => v.get_speech_segments(
                audio,
                min_speech_duration_ms,
                min_silence_duration_ms,
                SAMPLE_RATE_HZ,
            ),
            #[cfg(feature = "vad")]
            VadBackend::Ml(v) => v.get_speech_segments(
                audio,
                min_speech_duration_ms,
                min_silence_duration_ms,
                SAMPLE_RATE_HZ,
            ),
            VadBackend::Amplitude(v) => {
                v.get_speech_segments(audio, min_speech_duration_ms, min_silence_duration_ms)
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            #[cfg(feature = "vad")]
            VadBackend::Native(_) => "native",
            #[cfg(feature = "vad")]
            VadBackend::Ml(_) => "ml",
            VadBackend::Amplitude(_) => "amplitude",
        }
    }
}
