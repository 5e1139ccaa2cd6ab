//! C3 — rolling audio buffer: the latest `W` PCM samples, with a trigger
//! every `S` new samples. Grounded on the `RollingAudioBuffer` ring used by
//! the streaming manager it feeds.

use std::collections::VecDeque;

/// Default window: 6 s of 16 kHz audio gives Whisper-style backends enough
/// context for code-switched grammar without ballooning per-call latency.
pub const DEFAULT_WINDOW_MS: u64 = 6_000;
/// Default slide: bounds partial latency while leaving a 1 s overlap with
/// the previous window for robust deduplication.
pub const DEFAULT_SLIDE_MS: u64 = 2_000;
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Fixed-capacity ring of PCM samples (spec §3 `RollingBuffer`, §4.3).
pub struct RollingBuffer {
    window_size: usize,
    slide_size: usize,
    sample_rate: u32,
    buffer: VecDeque<i16>,
    samples_since_last_slide: usize,
}

impl RollingBuffer {
    pub fn new(window_duration_ms: u64, slide_duration_ms: u64, sample_rate: u32) -> Self {
        let window_size = ((window_duration_ms as u64 * sample_rate as u64) / 1000) as usize;
        let slide_size = ((slide_duration_ms as u64 * sample_rate as u64) / 1000) as usize;
        tracing::info!(
            window_duration_ms,
            window_size,
            slide_duration_ms,
            slide_size,
            "rolling buffer initialized"
        );
        Self {
            window_size,
            slide_size,
            sample_rate,
            buffer: VecDeque::with_capacity(window_size),
            samples_since_last_slide: 0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_WINDOW_MS, DEFAULT_SLIDE_MS, SAMPLE_RATE_HZ)
    }

    /// Appends samples to the ring, evicting the oldest once full. Returns
    /// `true` if at least `slide_size` new samples have accumulated since
    /// the last trigger (and resets the counter).
    pub fn add_samples(&mut self, samples: &[i16]) -> bool {
        for &s in samples {
            if self.buffer.len() == self.window_size {
                self.buffer.pop_front();
            }
            self.buffer.push_back(s);
        }
        self.samples_since_last_slide += samples.len();

        let triggered = self.samples_since_last_slide >= self.slide_size;
        if triggered {
            self.samples_since_last_slide = 0;
        }
        triggered
    }

    /// Returns the current window, zero-padded at the head if the buffer
    /// hasn't filled yet.
    pub fn get_window(&self) -> Vec<i16> {
        if self.buffer.len() < self.window_size {
            let mut window = vec![0i16; self.window_size];
            let start = self.window_size - self.buffer.len();
            for (i, &s) in self.buffer.iter().enumerate() {
                window[start + i] = s;
            }
            window
        } else {
            self.buffer.iter().copied().collect()
        }
    }

    pub fn get_window_bytes(&self) -> Vec<u8> {
        i16_slice_to_le_bytes(&self.get_window())
    }

    /// All currently buffered samples, unpadded — used by `forceFlush`.
    pub fn get_all_samples(&self) -> Vec<i16> {
        self.buffer.iter().copied().collect()
    }

    pub fn get_all_samples_bytes(&self) -> Vec<u8> {
        i16_slice_to_le_bytes(&self.get_all_samples())
    }

    pub fn get_buffer_duration_ms(&self) -> f64 {
        (self.buffer.len() as f64 / self.sample_rate as f64) * 1000.0
    }

    /// True once fill reaches 90% of the target window (avoids
    /// transcribing a near-empty buffer right after session start).
    pub fn is_viable(&self) -> bool {
        let min_viable = (self.window_size as f64 * 0.9) as usize;
        self.buffer.len() >= min_viable
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.samples_since_last_slide = 0;
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

fn i16_slice_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_yields_zero_padded_window() {
        let buf = RollingBuffer::new(1000, 500, 1000);
        let window = buf.get_window();
        assert_eq!(window.len(), 1000);
        assert!(window.iter().all(|&s| s == 0));
        assert!(!buf.is_viable());
    }

    #[test]
    fn slide_triggers_every_s_samples() {
        let mut buf = RollingBuffer::new(1000, 500, 1000);
        assert!(!buf.add_samples(&vec![1i16; 300]));
        assert!(buf.add_samples(&vec![1i16; 300]));
        assert!(!buf.add_samples(&vec![1i16; 100]));
    }

    #[test]
    fn window_is_zero_padded_at_head_when_partially_filled() {
        let mut buf = RollingBuffer::new(1000, 500, 1000);
        buf.add_samples(&vec![7i16; 200]);
        let window = buf.get_window();
        assert_eq!(window.len(), 1000);
        assert!(window[..800].iter().all(|&s| s == 0));
        assert!(window[800..].iter().all(|&s| s == 7));
    }

    #[test]
    fn viable_once_90_percent_full() {
        let mut buf = RollingBuffer::new(1000, 500, 1000);
        buf.add_samples(&vec![1i16; 899]);
        assert!(!buf.is_viable());
        buf.add_samples(&vec![1i16; 1]);
        assert!(buf.is_viable());
    }

    #[test]
    fn clear_resets_fill_and_slide_counter() {
        let mut buf = RollingBuffer::new(1000, 500, 1000);
        buf.add_samples(&vec![1i16; 600]);
        buf.clear();
        assert_eq!(buf.get_buffer_duration_ms(), 0.0);
        assert!(!buf.add_samples(&vec![1i16; 100]));
    }
}
