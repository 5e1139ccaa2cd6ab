//! Raw PCM <-> WAV container conversion (spec §6 "Audio format on the wire
//! and at rest"): single-channel, 16-bit, 16 kHz, one `fmt ` chunk, one
//! `data` chunk. Shared by C4's `forceFlush`, C5, C6, and C7.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

pub const SAMPLE_RATE_HZ: u32 = 16_000;
pub const BITS_PER_SAMPLE: u16 = 16;
pub const CHANNELS: u16 = 1;

/// Wraps raw signed-16-bit-LE mono PCM bytes in a minimal WAV container.
pub fn pcm_to_wav(pcm: &[u8], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let spec = WavSpec {
        channels: CHANNELS,
        sample_rate,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for chunk in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Extracts the raw sample bytes from a WAV file, re-encoded as
/// signed-16-bit-LE regardless of the container's original bit depth.
pub fn wav_to_pcm(wav: &[u8]) -> anyhow::Result<Vec<u8>> {
    let reader = hound::WavReader::new(Cursor::new(wav))?;
    let spec = reader.spec();
    let mut out = Vec::with_capacity(wav.len());

    match spec.sample_format {
        SampleFormat::Int => {
            for sample in reader.into_samples::<i16>() {
                out.extend_from_slice(&sample?.to_le_bytes());
            }
        }
        SampleFormat::Float => {
            for sample in reader.into_samples::<f32>() {
                let s = (sample? * i16::MAX as f32) as i16;
                out.extend_from_slice(&s.to_le_bytes());
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_raw_pcm_bytes() {
        let pcm: Vec<u8> = (0..1000u16)
            .flat_map(|i| (i as i16).to_le_bytes())
            .collect();
        let wav = pcm_to_wav(&pcm, SAMPLE_RATE_HZ).unwrap();
        assert!(wav.starts_with(b"RIFF"));
        let roundtripped = wav_to_pcm(&wav).unwrap();
        assert_eq!(roundtripped, pcm);
    }
}
