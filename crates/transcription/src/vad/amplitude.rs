//! Amplitude/RMS voice-activity fallback (spec §4.2 backend (c)). Always
//! available — never fails to construct — since it is the backstop the
//! manager falls back to when both model-backed tiers fail to load.

use super::SpeechSegment;

pub const DEFAULT_THRESHOLD: f32 = 0.08;

pub struct AmplitudeVad {
    threshold: f32,
    sample_rate: u32,
}

impl AmplitudeVad {
    pub fn new(threshold: f32, sample_rate: u32) -> Self {
        Self {
            threshold,
            sample_rate,
        }
    }

    pub fn is_speech(&self, frame: &[i16]) -> bool {
        if frame.is_empty() {
            return false;
        }
        let sum_sq: f64 = frame
            .iter()
            .map(|&s| {
                let f = s as f64 / 32768.0;
                f * f
            })
            .sum();
        let rms = (sum_sq / frame.len() as f64).sqrt();
        rms as f32 > self.threshold
    }

    pub fn get_speech_segments(
        &self,
        audio: &[i16],
        min_speech_duration_ms: u64,
        min_silence_duration_ms: u64,
    ) -> Vec<SpeechSegment> {
        let chunk_duration_ms: u64 = 100;
        let chunk_size = ((chunk_duration_ms * self.sample_rate as u64) / 1000) as usize;

        let mut segments = Vec::new();
        let mut current_start: Option<u64> = None;
        let mut silence_duration: u64 = 0;

        let mut i = 0;
        while i + chunk_size <= audio.len() {
            let chunk = &audio[i..i + chunk_size];
            let timestamp_ms = (i as u64 * 1000) / self.sample_rate as u64;

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
            let final_ts = (audio.len() as u64 * 1000) / self.sample_rate as u64;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(samples: usize, amplitude: i16) -> Vec<i16> {
        vec![amplitude; samples]
    }

    #[test]
    fn silence_is_not_speech() {
        let vad = AmplitudeVad::new(DEFAULT_THRESHOLD, 16_000);
        assert!(!vad.is_speech(&tone(256, 0)));
    }

    #[test]
    fn loud_tone_is_speech() {
        let vad = AmplitudeVad::new(DEFAULT_THRESHOLD, 16_000);
        assert!(vad.is_speech(&tone(256, 16_000)));
    }
}
