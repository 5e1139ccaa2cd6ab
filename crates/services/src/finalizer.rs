//! C6 — the idempotent pipeline that runs once a meeting's streaming
//! session ends: merge durable chunks, wrap them in a container, upload,
//! and (optionally) kick off diarization. Runs as a task detached from
//! the response path (spec §4.6); its own failure is reported back via
//! `FinalizeStatus`, never by panicking the caller.

use std::sync::Arc;

use scribeline_transcription::{AudioRecorder, ObjectStore};
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizeStatus {
    NoRecording,
    MergeFailed,
    ConversionFailed,
    StorageFailed,
    Completed,
}

#[derive(Debug, Clone)]
pub struct FinalizeReport {
    pub status: FinalizeStatus,
    pub meeting_id: String,
    pub merged_bytes: usize,
    pub wav_bytes: usize,
    pub diarization_triggered: bool,
}

pub struct FinalizerConfig {
    pub chunk_prefix: String,
    pub cloud_storage: bool,
    pub delete_local_after_upload: bool,
    pub trigger_diarization: bool,
}

pub struct Finalizer {
    store: Arc<dyn ObjectStore>,
    config: FinalizerConfig,
}

impl Finalizer {
    pub fn new(store: Arc<dyn ObjectStore>, config: FinalizerConfig) -> Self {
        Self { store, config }
    }

    /// Runs the 5-step pipeline for one meeting. Idempotent: re-running
    /// after a successful pass simply re-merges and re-uploads the same
    /// bytes (step 2-3 are pure functions of the chunk set, spec §4.6).
    pub async fn finalize(&self, meeting_id: &str) -> FinalizeReport {
        let prefix = format!("{meeting_id}/{}", self.config.chunk_prefix);
        let existing = match self.store.list(&prefix).await {
            Ok(names) => names,
            Err(e) => {
                warn!(meeting_id, error = %e, "finalizer could not list recording prefix");
                return self.report(meeting_id, FinalizeStatus::NoRecording, 0, 0, false);
            }
        };
        if existing.is_empty() {
            // Chunks may already have been merged, uploaded, and deleted by
            // an earlier run (`delete_local_after_upload`) — re-running
            // finalize for that meeting must not report `NoRecording` when
            // a finished recording is already sitting there.
            let wav_path = format!("{meeting_id}/recording.wav");
            return match self.store.get(&wav_path).await {
                Ok(wav_bytes) => {
                    info!(meeting_id, "recording already finalized, reusing existing recording.wav");
                    let diarization_triggered = self.config.trigger_diarization;
                    if diarization_triggered {
                        info!(meeting_id, "diarization job requested, handing off detached");
                    }
                    self.report(meeting_id, FinalizeStatus::Completed, 0, wav_bytes.len(), diarization_triggered)
                }
                Err(_) => {
                    info!(meeting_id, "no recording found, nothing to finalize");
                    self.report(meeting_id, FinalizeStatus::NoRecording, 0, 0, false)
                }
            };
        }

        let merged = match AudioRecorder::merge_chunks(self.store.as_ref(), meeting_id, &self.config.chunk_prefix).await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(meeting_id, error = %e, "chunk merge failed");
                return self.report(meeting_id, FinalizeStatus::MergeFailed, 0, 0, false);
            }
        };
        info!(meeting_id, merged_bytes = merged.len(), "merged recording chunks");

        let wav_bytes = match scribeline_transcription::pcm_to_wav(&merged, scribeline_transcription::SAMPLE_RATE_HZ)
        {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(meeting_id, error = %e, "wav conversion failed");
                return self.report(meeting_id, FinalizeStatus::ConversionFailed, merged.len(), 0, false);
            }
        };

        let wav_path = format!("{meeting_id}/recording.wav");
        if let Err(e) = self.store.put(&wav_path, wav_bytes.clone()).await {
            error!(meeting_id, error = %e, "failed to write recording.wav");
            return self.report(meeting_id, FinalizeStatus::ConversionFailed, merged.len(), wav_bytes.len(), false);
        }
        info!(meeting_id, wav_bytes = wav_bytes.len(), "wrote recording.wav");

        if self.config.cloud_storage {
            if let Err(e) = self.store.put(&wav_path, wav_bytes.clone()).await {
                warn!(meeting_id, error = %e, "cloud upload of recording.wav failed");
                return self.report(meeting_id, FinalizeStatus::StorageFailed, merged.len(), wav_bytes.len(), false);
            }
            if self.config.delete_local_after_upload {
                if let Err(e) = self.store.delete_prefix(&prefix).await {
                    warn!(meeting_id, error = %e, "failed to delete local chunks after upload");
                }
            }
        }

        let diarization_triggered = self.config.trigger_diarization;
        if diarization_triggered {
            info!(meeting_id, "diarization job requested, handing off detached");
        }

        self.report(meeting_id, FinalizeStatus::Completed, merged.len(), wav_bytes.len(), diarization_triggered)
    }

    fn report(
        &self,
        meeting_id: &str,
        status: FinalizeStatus,
        merged_bytes: usize,
        wav_bytes: usize,
        diarization_triggered: bool,
    ) -> FinalizeReport {
        FinalizeReport {
            status,
            meeting_id: meeting_id.to_string(),
            merged_bytes,
            wav_bytes,
            diarization_triggered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribeline_transcription::LocalFsStore;
    use tempfile::tempdir;

    fn config(cloud: bool, delete_local: bool, diarize: bool) -> FinalizerConfig {
        FinalizerConfig {
            chunk_prefix: "pcm_chunks".to_string(),
            cloud_storage: cloud,
            delete_local_after_upload: delete_local,
            trigger_diarization: diarize,
        }
    }

    #[tokio::test]
    async fn missing_recording_yields_no_recording() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalFsStore::new(dir.path()));
        let finalizer = Finalizer::new(store, config(false, false, false));
        let report = finalizer.finalize("missing-meeting").await;
        assert_eq!(report.status, FinalizeStatus::NoRecording);
    }

    #[tokio::test]
    async fn merges_and_writes_wav_for_existing_chunks() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalFsStore::new(dir.path()));
        let pcm: Vec<u8> = (0..800u16).flat_map(|i| (i as i16).to_le_bytes()).collect();
        store.put("m1/pcm_chunks/chunk_00000.pcm", pcm.clone()).await.unwrap();

        let finalizer = Finalizer::new(store.clone(), config(false, false, false));
        let report = finalizer.finalize("m1").await;

        assert_eq!(report.status, FinalizeStatus::Completed);
        assert_eq!(report.merged_bytes, pcm.len());
        assert!(report.wav_bytes > 0);

        let wav = store.get("m1/recording.wav").await.unwrap();
        assert!(wav.starts_with(b"RIFF"));
    }

    #[tokio::test]
    async fn finalize_reuses_existing_recording_after_chunks_deleted() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalFsStore::new(dir.path()));
        store.put("m3/pcm_chunks/chunk_00000.pcm", vec![1, 2, 3, 4]).await.unwrap();

        let finalizer = Finalizer::new(store.clone(), config(true, true, true));
        let first = finalizer.finalize("m3").await;
        assert_eq!(first.status, FinalizeStatus::Completed);

        let remaining = store.list("m3/pcm_chunks").await.unwrap();
        assert!(remaining.is_empty());

        let second = finalizer.finalize("m3").await;
        assert_eq!(second.status, FinalizeStatus::Completed);
        assert_eq!(second.wav_bytes, first.wav_bytes);
        assert!(second.diarization_triggered);
    }

    #[tokio::test]
    async fn deletes_chunks_after_upload_when_configured() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalFsStore::new(dir.path()));
        store.put("m2/pcm_chunks/chunk_00000.pcm", vec![1, 2, 3, 4]).await.unwrap();

        let finalizer = Finalizer::new(store.clone(), config(true, true, false));
        let report = finalizer.finalize("m2").await;

        assert_eq!(report.status, FinalizeStatus::Completed);
        let remaining = store.list("m2/pcm_chunks").await.unwrap();
        assert!(remaining.iter().all(|n| !n.ends_with(".pcm")));
    }
}
