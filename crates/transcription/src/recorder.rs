//! C5 — chunked durable audio capture, run in parallel to live
//! transcription so a crash mid-meeting loses at most one partial chunk.
//! Grounded on
//! `examples/original_source/backend/app/services/audio/recorder.py`'s
//! `AudioRecorder`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::RecorderConfig;
use crate::storage::{ObjectStore, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("recorder is not currently recording")]
    NotRecording,
}

/// Metadata recorded for a single saved chunk (spec §5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub chunk_index: u32,
    pub filename: String,
    pub storage_path: String,
    pub start_time_seconds: f64,
    pub end_time_seconds: f64,
    pub duration_seconds: f64,
    pub size_bytes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub format: &'static str,
}

/// Final metadata produced by `stop` (spec §5).
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSummary {
    pub meeting_id: String,
    pub total_duration_seconds: f64,
    pub chunk_count: usize,
    pub storage_prefix: String,
    pub audio_format: AudioFormat,
    pub chunks: Vec<ChunkInfo>,
}

struct RecorderState {
    buffer: Vec<u8>,
    chunk_index: u32,
    chunk_start_offset: f64,
    chunks: Vec<ChunkInfo>,
}

/// Captures PCM audio for one session/meeting into fixed-size chunks on an
/// `ObjectStore`, independent of the live transcription pipeline's rolling
/// window (spec §5 "Decouple durability from transcription latency").
pub struct AudioRecorder {
    session_id: String,
    chunk_prefix: String,
    config: RecorderConfig,
    store: Arc<dyn ObjectStore>,

    is_recording: AtomicBool,
    recording_start_epoch_secs: AtomicU64,
    state: Mutex<RecorderState>,
}

impl AudioRecorder {
    pub fn new(session_id: impl Into<String>, config: RecorderConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            session_id: session_id.into(),
            chunk_prefix: "pcm_chunks".to_string(),
            config,
            store,
            is_recording: AtomicBool::new(false),
            recording_start_epoch_secs: AtomicU64::new(0),
            state: Mutex::new(RecorderState {
                buffer: Vec::new(),
                chunk_index: 0,
                chunk_start_offset: 0.0,
                chunks: Vec::new(),
            }),
        }
    }

    pub fn start(&self) {
        self.is_recording.store(true, Ordering::SeqCst);
        self.recording_start_epoch_secs.store(now_epoch_secs(), Ordering::SeqCst);
        info!(session_id = %self.session_id, "audio recording started");
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording.load(Ordering::SeqCst)
    }

    /// Appends PCM bytes to the in-flight chunk, flushing to storage once
    /// `chunk_size_bytes()` is reached. The staging buffer is swapped out
    /// under the lock before the (possibly slow) storage write so inbound
    /// audio is never blocked on I/O (spec §5 step 2).
    pub async fn add_chunk(&self, audio_data: &[u8]) -> Result<Option<ChunkInfo>, RecorderError> {
        if !self.is_recording() {
            return Ok(None);
        }

        let target = self.config.chunk_size_bytes();
        let (data_to_save, chunk_index, chunk_start_offset, chunk_end_offset) = {
            let mut state = self.state.lock().await;
            state.buffer.extend_from_slice(audio_data);

            if state.buffer.len() < target {
                return Ok(None);
            }

            let data = std::mem::take(&mut state.buffer);
            let start_offset = state.chunk_start_offset;
            let elapsed = self.elapsed_secs();
            state.chunk_start_offset = elapsed;
            (data, state.chunk_index, start_offset, elapsed)
        };

        let info = self
            .save_chunk(data_to_save, chunk_index, chunk_start_offset, chunk_end_offset)
            .await?;

        {
            let mut state = self.state.lock().await;
            state.chunk_index += 1;
            state.chunks.push(info.clone());
        }

        Ok(Some(info))
    }

    async fn save_chunk(
        &self,
        data: Vec<u8>,
        chunk_index: u32,
        start_offset: f64,
        end_offset: f64,
    ) -> Result<ChunkInfo, RecorderError> {
        let filename = format!("chunk_{chunk_index:05}.pcm");
        let relative_path = format!("{}/{}/{}", self.session_id, self.chunk_prefix, filename);
        let duration = data.len() as f64 / self.config.bytes_per_second as f64;
        let size_bytes = data.len();

        self.store.put(&relative_path, data).await?;

        info!(chunk_index, duration, "saved audio chunk");

        Ok(ChunkInfo {
            chunk_index,
            filename,
            storage_path: relative_path,
            start_time_seconds: start_offset,
            end_time_seconds: end_offset,
            duration_seconds: duration,
            size_bytes,
        })
    }

    /// Flushes the current staging buffer and finalizes the session,
    /// writing a `metadata.json` object alongside the chunks (spec §5
    /// step 5, `stop`).
    pub async fn stop(&self) -> Result<RecordingSummary, RecorderError> {
        if !self.is_recording() {
            return Err(RecorderError::NotRecording);
        }
        self.is_recording.store(false, Ordering::SeqCst);

        let remaining = {
            let mut state = self.state.lock().await;
            if state.buffer.is_empty() {
                None
            } else {
                Some((
                    std::mem::take(&mut state.buffer),
                    state.chunk_index,
                    state.chunk_start_offset,
                ))
            }
        };

        if let Some((data, chunk_index, start_offset)) = remaining {
            let end_offset = self.elapsed_secs();
            let info = self.save_chunk(data, chunk_index, start_offset, end_offset).await?;
            let mut state = self.state.lock().await;
            state.chunk_index += 1;
            state.chunks.push(info);
        }

        let state = self.state.lock().await;
        let summary = RecordingSummary {
            meeting_id: self.session_id.clone(),
            total_duration_seconds: self.elapsed_secs(),
            chunk_count: state.chunks.len(),
            storage_prefix: format!("{}/{}", self.session_id, self.chunk_prefix),
            audio_format: AudioFormat {
                sample_rate: crate::wav::SAMPLE_RATE_HZ,
                channels: crate::wav::CHANNELS,
                bits_per_sample: crate::wav::BITS_PER_SAMPLE,
                format: "PCM",
            },
            chunks: state.chunks.clone(),
        };

        let metadata_path = format!("{}/{}/metadata.json", self.session_id, self.chunk_prefix);
        if let Ok(json) = serde_json::to_vec_pretty(&summary) {
            let _ = self.store.put(&metadata_path, json).await;
        }

        info!(
            session_id = %self.session_id,
            chunk_count = summary.chunk_count,
            total_duration_seconds = summary.total_duration_seconds,
            "audio recording stopped"
        );

        Ok(summary)
    }

    fn elapsed_secs(&self) -> f64 {
        let start = self.recording_start_epoch_secs.load(Ordering::SeqCst);
        if start == 0 {
            0.0
        } else {
            (now_epoch_secs().saturating_sub(start)) as f64
        }
    }

    /// Concatenates every `chunk_*.pcm` object under this session's prefix
    /// in lexicographic (== chunk-index) order (spec §5 step 4, §6 `merge`).
    /// Idempotent: a prior run's merged output is cached under the same
    /// prefix and reused rather than re-downloaded and re-concatenated, so
    /// re-running the finalizer for an already-merged session is cheap and
    /// cannot drift from the first merge's bytes.
    pub async fn merge_chunks(
        store: &dyn ObjectStore,
        session_id: &str,
        chunk_prefix: &str,
    ) -> Result<Vec<u8>, RecorderError> {
        let merged_path = format!("{session_id}/{chunk_prefix}/merged.pcm");
        match store.get(&merged_path).await {
            Ok(cached) => return Ok(cached),
            Err(StorageError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let prefix = format!("{session_id}/{chunk_prefix}");
        let mut names = store.list(&prefix).await?;
        names.retain(|n| n.ends_with(".pcm"));
        names.sort();

        let mut merged = Vec::new();
        for name in names {
            let data = store.get(&name).await?;
            merged.extend_from_slice(&data);
        }

        store.put(&merged_path, merged.clone()).await?;
        Ok(merged)
    }

    /// Renames a session's storage prefix to its bound meeting id once the
    /// meeting identity is known (spec §5 step 6, "rename-on-bind").
    pub async fn rebind_prefix(
        store: &dyn ObjectStore,
        old_session_id: &str,
        new_meeting_id: &str,
        chunk_prefix: &str,
    ) -> Result<(), RecorderError> {
        let old_prefix = format!("{old_session_id}/{chunk_prefix}");
        let names = store.list(&old_prefix).await?;
        for name in names {
            let data = store.get(&name).await?;
            let new_name = name.replacen(old_session_id, new_meeting_id, 1);
            store.put(&new_name, data).await?;
        }
        store.delete_prefix(&format!("{old_session_id}/{chunk_prefix}")).await?;
        Ok(())
    }
}

fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalFsStore;
    use tempfile::tempdir;

    fn tiny_config() -> RecorderConfig {
        RecorderConfig {
            chunk_duration_secs: 1,
            bytes_per_second: 100,
            staging_dir: "unused".to_string(),
        }
    }

    #[tokio::test]
    async fn chunk_indices_are_dense_and_zero_padded() {
        let dir = tempdir().unwrap();
        let store = Arc::new(LocalFsStore::new(dir.path()));
        let recorder = AudioRecorder::new("meeting-1", tiny_config(), store);
        recorder.start();

        let first = recorder.add_chunk(&vec![1u8; 100]).await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().filename, "chunk_00000.pcm");

        let second = recorder.add_chunk(&vec![2u8; 100]).await.unwrap();
        assert_eq!(second.unwrap().filename, "chunk_00001.pcm");
    }

    #[tokio::test]
    async fn add_chunk_is_noop_before_start() {
        let dir = tempdir().unwrap();
        let store = Arc::new(LocalFsStore::new(dir.path()));
        let recorder = AudioRecorder::new("meeting-2", tiny_config(), store);
        let result = recorder.add_chunk(&vec![0u8; 1000]).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn stop_flushes_partial_buffer_and_writes_metadata() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalFsStore::new(dir.path()));
        let recorder = AudioRecorder::new("meeting-3", tiny_config(), store.clone());
        recorder.start();
        recorder.add_chunk(&vec![9u8; 30]).await.unwrap(); // below target, stays buffered

        let summary = recorder.stop().await.unwrap();
        assert_eq!(summary.chunk_count, 1);
        assert_eq!(summary.chunks[0].size_bytes, 30);

        let metadata = store.get("meeting-3/pcm_chunks/metadata.json").await.unwrap();
        assert!(!metadata.is_empty());
    }

    #[tokio::test]
    async fn merge_chunks_concatenates_in_lexicographic_order() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(LocalFsStore::new(dir.path()));
        store.put("m/pcm_chunks/chunk_00001.pcm", vec![2, 2]).await.unwrap();
        store.put("m/pcm_chunks/chunk_00000.pcm", vec![1, 1]).await.unwrap();

        let merged = AudioRecorder::merge_chunks(store.as_ref(), "m", "pcm_chunks").await.unwrap();
        assert_eq!(merged, vec![1, 1, 2, 2]);
    }
}
