//! ONNX-backed voice-activity tiers (spec §4.2 backends (a) and (b)).
//!
//! The reference implementation distinguishes a native C/C++ engine from a
//! separate ML model; no native VAD binding crate was available alongside
//! the rest of this project's dependency set, so both tiers load an ONNX
//! model via `ort` and differ only in frame size and default threshold —
//! see DESIGN.md for the substitution note.

use std::path::Path;

use ndarray::{Array2, CowArray};
use ort::{session::Session, value::Value};

use super::SpeechSegment;

pub struct OnnxVad {
    session: Session,
    frame_size: usize,
    threshold: f32,
}

impl OnnxVad {
    pub fn load(model_path: impl AsRef<Path>, frame_size: usize, threshold: f32) -> anyhow::Result<Self> {
        let path = model_path.as_ref();
        tracing::info!(model_path = %path.display(), frame_size, "loading onnx VAD model");
        let session = Session::builder()?.commit_from_file(path)?;
        Ok(Self {
            session,
            frame_size,
            threshold,
        })
    }

    fn speech_probability(&self, frame: &[i16]) -> anyhow::Result<f32> {
        let floats: Vec<f32> = frame.iter().map(|&s| s as f32 / 32768.0).collect();
        let input = Array2::from_shape_vec((1, floats.len()), floats)?;
        let input = CowArray::from(input);
        let inputs = ort::inputs!["input" => Value::from_array(input)?]?;
        let outputs = self.session.run(inputs)?;
        let (_, data) = outputs[0].try_extract_raw_tensor::<f32>()?;
        Ok(*data.first().unwrap_or(&0.0))
    }

    /// Breaks `frame` into `frame_size`-sample sub-frames (zero-padding a
    /// short trailing piece) and returns true if any sub-frame's speech
    /// probability exceeds the threshold.
    pub fn is_speech(&self, frame: &[i16]) -> bool {
        let mut buf = vec![0i16; self.frame_size];
        let mut i = 0;
        while i < frame.len() {
            let end = (i + self.frame_size).min(frame.len());
            let len = end - i;
            buf[..len].copy_from_slice(&frame[i..end]);
            if len < self.frame_size {
                buf[len..].fill(0);
            }
            match self.speech_probability(&buf) {
                Ok(p) if p > self.threshold => return true,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "onnx VAD inference failed on sub-frame");
                    return false;
                }
            }
            i += self.frame_size;
        }
        false
    }

    pub fn get_speech_segments(
        &self,
        audio: &[i16],
        min_speech_duration_ms: u64,
        min_silence_duration_ms: u64,
        sample_rate: u32,
    ) -> Vec<SpeechSegment> {
        let chunk_size = self.frame_size;
        let chunk_duration_ms = (chunk_size as u64 * 1000) / sample_rate as u64;

        let mut segments = Vec::new();
        let mut current_start: Option<u64> = None;
        let mut silence_duration: u64 = 0;

        let mut i = 0;
        while i + chunk_size <= audio.len() {
            let chunk = &audio[i..i + chunk_size];
            let timestamp_ms = (i as u64 * 1000) / sample_rate as u64;

            if self.is_speech(chunk) {
                silence_duration = 0;
                if current_start.is_none() {
                    current_start = Some(timestamp_ms);
                }
            } else {
                silence_duration += chunk_duration_ms;
                if let Some(start) = current_start {
                    if silence_duration >= min_silence_duration_ms {
                        let duration = timestamp_ms.saturating_sub(start);
                        if duration >= min_speech_duration_ms {
                            segments.push(SpeechSegment {
                                start_ms: start,
                                end_ms: timestamp_ms,
                            });
                        }
                        current_start = None;
                    }
                }
            }
            i += chunk_size;
        }

        if let Some(start) = current_start {
            let final_ts = (audio.len() as u64 * 1000) / sample_rate as u64;
            let duration = final_ts.saturating_sub(start);
            if duration >= min_speech_duration_ms {
                segments.push(SpeechSegment {
                    start_ms: start,
                    end_ms: final_ts,
                });
            }
        }

        segments
    }
}
