use std::sync::Arc;

use scribeline_services::{FinalizeStatus, Finalizer, FinalizerConfig};
use scribeline_transcription::{AudioRecorder, LocalFsStore, ObjectStore, RecorderConfig};
use tempfile::tempdir;

fn tiny_config() -> RecorderConfig {
    RecorderConfig {
        chunk_duration_secs: 1,
        bytes_per_second: 100,
        staging_dir: "unused".to_string(),
    }
}

fn no_upload_config() -> FinalizerConfig {
    FinalizerConfig {
        chunk_prefix: "pcm_chunks".to_string(),
        cloud_storage: false,
        delete_local_after_upload: false,
        trigger_diarization: false,
    }
}

#[tokio::test]
async fn finalize_merges_recorded_chunks_into_a_wav_file() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(LocalFsStore::new(dir.path()));
    let meeting_id = "meeting-finalize-1";

    let recorder = AudioRecorder::new(meeting_id, tiny_config(), store.clone());
    recorder.start();
    for _ in 0..3 {
        recorder.add_chunk(&vec![7u8; 100]).await.unwrap();
    }
    let summary = recorder.stop().await.unwrap();
    assert_eq!(summary.chunk_count, 3);

    let finalizer = Finalizer::new(store.clone(), no_upload_config());
    let report = finalizer.finalize(meeting_id).await;

    assert_eq!(report.status, FinalizeStatus::Completed);
    assert_eq!(report.merged_bytes, 300);
    assert!(report.wav_bytes > report.merged_bytes);

    let wav = store.get(&format!("{meeting_id}/recording.wav")).await.unwrap();
    assert_eq!(wav.len(), report.wav_bytes);
    assert_eq!(&wav[0..4], b"RIFF");
}

#[tokio::test]
async fn finalize_is_idempotent_across_repeated_runs() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(LocalFsStore::new(dir.path()));
    let meeting_id = "meeting-finalize-2";

    let recorder = AudioRecorder::new(meeting_id, tiny_config(), store.clone());
    recorder.start();
    recorder.add_chunk(&vec![3u8; 100]).await.unwrap();
    recorder.stop().await.unwrap();

    let finalizer = Finalizer::new(store.clone(), no_upload_config());
    let first = finalizer.finalize(meeting_id).await;
    let second = finalizer.finalize(meeting_id).await;

    assert_eq!(first.status, FinalizeStatus::Completed);
    assert_eq!(second.status, FinalizeStatus::Completed);
    assert_eq!(first.wav_bytes, second.wav_bytes);
}

#[tokio::test]
async fn finalize_with_no_recording_reports_no_recording() {
    let dir = tempdir().unwrap();
    let store: Arc<dyn ObjectStore> = Arc::new(LocalFsStore::new(dir.path()));
    let finalizer = Finalizer::new(store, no_upload_config());

    let report = finalizer.finalize("never-recorded").await;
    assert_eq!(report.status, FinalizeStatus::NoRecording);
    assert_eq!(report.merged_bytes, 0);
}
