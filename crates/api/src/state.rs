//! Process-wide runtime state held by the `crates/api` binary. Follows
//! the teacher's `state::AppState` shape (one `Clone`-able struct handed
//! to every route/handler via axum's `State` extractor), generalized
//! from the teacher's per-tenant service handles to this crate's
//! session/recorder registries.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use mongodb::Database;
use scribeline_config::Settings;
use scribeline_services::{DiarizationPipeline, Finalizer, MeetingDao, TranscriptSegmentDao};
use scribeline_transcription::{
    AsrBackend, AudioRecorder, ObjectStore, RecorderConfig, StreamingConfig,
    StreamingTranscriptionManager,
};
use tokio::sync::Mutex;

/// One live streaming session's manager, behind a lock since
/// `process_frame`/`force_flush` take `&mut self` and a session's worker
/// task is its only caller (spec §5 "ownership").
pub struct ManagerHandle {
    pub manager: Mutex<StreamingTranscriptionManager>,
    pub connection_count: AtomicUsize,
}

/// Session table, connection counts, and active-recorder table as
/// per-key-locked concurrent maps (spec Design Notes §9), rather than
/// the single coarse mutex spec.md's prose describes — `dashmap` is the
/// teacher's own choice for exactly this kind of registry (see the
/// teacher's `ws::storage::WsStorage`).
#[derive(Default)]
pub struct Runtime {
    sessions: DashMap<String, Arc<ManagerHandle>>,
    recorders: DashMap<String, Arc<AudioRecorder>>,
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_manager(
        &self,
        session_id: &str,
        asr: Arc<dyn AsrBackend>,
        config: &StreamingConfig,
    ) -> Arc<ManagerHandle> {
        if let Some(existing) = self.sessions.get(session_id) {
            existing.connection_count.fetch_add(1, Ordering::SeqCst);
            return existing.clone();
        }

        let vad = scribeline_transcription::VadBackend::construct(&config.vad_model_paths);
        let buffer = scribeline_transcription::RollingBuffer::new(
            config.window_duration_ms,
            config.slide_duration_ms,
            config.sample_rate_hz,
        );
        let manager = StreamingTranscriptionManager::new(asr, buffer, vad);
        let handle = Arc::new(ManagerHandle {
            manager: Mutex::new(manager),
            connection_count: AtomicUsize::new(1),
        });
        self.sessions.insert(session_id.to_string(), handle.clone());
        handle
    }

    /// Decrements the connection counter for a session; returns `true` if
    /// it reached zero, in which case the caller should destroy the
    /// manager (spec §4.1 shutdown step 5).
    pub fn release_session(&self, session_id: &str) -> bool {
        let Some(entry) = self.sessions.get(session_id) else {
            return false;
        };
        let remaining = entry.connection_count.fetch_sub(1, Ordering::SeqCst) - 1;
        remaining == 0
    }

    pub fn remove_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    pub fn get_or_create_recorder(
        &self,
        session_id: &str,
        config: RecorderConfig,
        store: Arc<dyn ObjectStore>,
    ) -> Arc<AudioRecorder> {
        if let Some(existing) = self.recorders.get(session_id) {
            return existing.clone();
        }
        let recorder = Arc::new(AudioRecorder::new(session_id, config, store));
        self.recorders.insert(session_id.to_string(), recorder.clone());
        recorder
    }

    pub fn remove_recorder(&self, session_id: &str) -> Option<Arc<AudioRecorder>> {
        self.recorders.remove(session_id).map(|(_, v)| v)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: Database,
    pub runtime: Arc<Runtime>,
    pub object_store: Arc<dyn ObjectStore>,
    pub asr: Arc<dyn AsrBackend>,
    pub meeting_dao: Arc<MeetingDao>,
    pub transcript_segment_dao: Arc<TranscriptSegmentDao>,
    pub finalizer: Arc<Finalizer>,
    pub diarization_pipeline: Arc<DiarizationPipeline>,
}
