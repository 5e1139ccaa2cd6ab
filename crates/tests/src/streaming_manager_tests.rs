use std::sync::Arc;

use scribeline_transcription::{
    ManagerEvent, RollingBuffer, StreamingTranscriptionManager, TriggerReason, VadBackend, VadModelPaths,
};

use crate::fixtures::fake_asr::FakeAsrBackend;

/// One long contiguous speech frame (loud tone, well above the amplitude
/// VAD threshold) spanning `secs` seconds at 16kHz mono 16-bit.
fn speech_seconds(secs: f64) -> Vec<u8> {
    let samples = (secs * 16_000.0) as usize;
    vec![0x10, 0x27].repeat(samples)
}

#[tokio::test]
async fn a_long_sentence_triggers_punctuation_finalization() {
    let asr = Arc::new(FakeAsrBackend::new(vec!["Hello world, this is a test."]));
    let mut manager = StreamingTranscriptionManager::new(
        asr,
        RollingBuffer::with_defaults(),
        VadBackend::construct(&VadModelPaths::default()),
    );

    // 6.5s of contiguous speech fills the 6s rolling window past its 90%
    // viability threshold and exceeds the 2s punctuation-minimum duration
    // in a single call, so the very first backend call already finalizes.
    let events = manager.process_frame(&speech_seconds(6.5), Some(0.0)).await;

    let finals: Vec<_> = events
        .into_iter()
        .filter_map(|e| match e {
            ManagerEvent::Final(segment) => Some(segment),
            ManagerEvent::Error { .. } => None,
        })
        .collect();

    assert_eq!(finals.len(), 1);
    let segment = &finals[0];
    assert_eq!(segment.reason, TriggerReason::Punctuation);
    assert_eq!(segment.text, "Hello world, this is a test.");
    assert_eq!(segment.audio_start_time, 0.0);
    assert!(segment.audio_end_time > segment.audio_start_time);
}

#[tokio::test]
async fn client_timestamp_regression_is_clamped_not_accepted() {
    let asr = Arc::new(FakeAsrBackend::new(vec!["Regression test sentence."]));
    let mut manager = StreamingTranscriptionManager::new(
        asr,
        RollingBuffer::with_defaults(),
        VadBackend::construct(&VadModelPaths::default()),
    );

    // Speech starts at 5.0 — this is when `speech_start_time` latches and
    // later finalization must still report it, regardless of what happens
    // to the clock afterward.
    manager.process_frame(&speech_seconds(0.2), Some(5.0)).await;
    // A client timestamp that regresses (5.0 -> 4.8) must be clamped to
    // last_chunk_timestamp + 0.1 rather than accepted as-is (spec §4.4
    // step 1), so the session clock never runs backward.
    manager.process_frame(&speech_seconds(0.2), Some(4.8)).await;

    // Enough further contiguous speech, ending in punctuation, to finalize.
    let events = manager.process_frame(&speech_seconds(6.5), Some(6.0)).await;

    let finals: Vec<_> = events
        .into_iter()
        .filter_map(|e| match e {
            ManagerEvent::Final(segment) => Some(segment),
            ManagerEvent::Error { .. } => None,
        })
        .collect();

    assert_eq!(finals.len(), 1);
    let segment = &finals[0];
    assert!(segment.audio_start_time >= 5.0);
    assert!(segment.audio_end_time > segment.audio_start_time);
}

#[tokio::test]
async fn reset_clears_pending_state_for_a_fresh_session() {
    let asr = Arc::new(FakeAsrBackend::new(vec![]));
    let mut manager = StreamingTranscriptionManager::new(
        asr,
        RollingBuffer::with_defaults(),
        VadBackend::construct(&VadModelPaths::default()),
    );

    manager.process_frame(&speech_seconds(1.0), Some(0.0)).await;
    manager.reset();

    // After reset, a force_flush on the now-empty buffer has nothing to say.
    assert!(manager.force_flush().await.is_none());
}
