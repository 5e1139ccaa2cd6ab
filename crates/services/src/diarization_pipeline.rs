//! Wires C6's finalizer output into C7 (diarization) → C8 (alignment) →
//! C9 (version store) as one detached unit of work per meeting (spec §2
//! data-flow step 6, §4.7 `diarize` contract, §7 "Diarization
//! cancellation"). Not itself one of the source's modules — the pipeline
//! shape is this repo's Rust-native composition of the three services,
//! since the original keeps the equivalent glue inline in a background-task
//! runner rather than a named class.

use std::sync::Arc;

use scribeline_db::models::{DiarizationJobStatus, TranscriptSource};
use scribeline_transcription::{pcm_to_wav, AsrBackend, AudioRecorder, ObjectStore, SAMPLE_RATE_HZ};
use tracing::{info, warn};

use crate::alignment::{AlignmentEngine, TranscriptInput};
use crate::dao::DiarizationJobDao;
use crate::diarization::DiarizationService;
use crate::version_store::VersionStore;

#[derive(Debug, Clone, PartialEq)]
pub enum DiarizationOutcome {
    Disabled,
    AlreadyRunning,
    NoAudio,
    Stopped,
    Failed(String),
    Completed { version_num: u64, speaker_count: usize },
}

pub struct DiarizationPipelineConfig {
    pub enabled: bool,
    pub chunk_prefix: String,
}

/// Orchestrates one meeting's post-recording diarization run. Constructed
/// once per process and shared across meetings; `run` is safe to call
/// concurrently for different meetings and is guarded per-meeting by
/// `DiarizationJobDao::try_start`.
pub struct DiarizationPipeline {
    store: Arc<dyn ObjectStore>,
    asr: Arc<dyn AsrBackend>,
    diarization: Arc<DiarizationService>,
    alignment: AlignmentEngine,
    versions: Arc<VersionStore>,
    jobs: Arc<DiarizationJobDao>,
    config: DiarizationPipelineConfig,
    provider_name: &'static str,
}

impl DiarizationPipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        asr: Arc<dyn AsrBackend>,
        diarization: Arc<DiarizationService>,
        versions: Arc<VersionStore>,
        jobs: Arc<DiarizationJobDao>,
        config: DiarizationPipelineConfig,
        provider_name: &'static str,
    ) -> Self {
        Self {
            store,
            asr,
            diarization,
            alignment: AlignmentEngine::new(),
            versions,
            jobs,
            config,
            provider_name,
        }
    }

    /// Runs the full diarize → align → persist pipeline for one meeting.
    /// Never panics; every failure mode is reported through the returned
    /// `DiarizationOutcome` rather than propagated, since this always runs
    /// detached from a client-facing response path (spec §4.6 step 5, §7).
    pub async fn run(&self, meeting_id: &str) -> DiarizationOutcome {
        if !self.config.enabled {
            return DiarizationOutcome::Disabled;
        }

        match self.jobs.try_start(meeting_id, self.provider_name).await {
            Ok(true) => {}
            Ok(false) => return DiarizationOutcome::AlreadyRunning,
            Err(e) => {
                warn!(meeting_id, error = %e, "failed to claim diarization job slot");
                return DiarizationOutcome::Failed(e.to_string());
            }
        }

        let outcome = self.run_claimed(meeting_id).await;

        match &outcome {
            DiarizationOutcome::Completed { .. } => {
                let _ = self.jobs.complete(meeting_id).await;
            }
            DiarizationOutcome::Stopped => {
                // already marked `stopped` by whoever requested cancellation
            }
            DiarizationOutcome::Failed(reason) => {
                let _ = self.jobs.fail(meeting_id, reason).await;
            }
            DiarizationOutcome::NoAudio => {
                let _ = self.jobs.fail(meeting_id, "no audio source found").await;
            }
            DiarizationOutcome::Disabled | DiarizationOutcome::AlreadyRunning => {}
        }

        outcome
    }

    async fn run_claimed(&self, meeting_id: &str) -> DiarizationOutcome {
        let audio = match self.resolve_audio(meeting_id).await {
            Some(bytes) => bytes,
            None => return DiarizationOutcome::NoAudio,
        };

        if self.is_stopped(meeting_id).await {
            return DiarizationOutcome::Stopped;
        }

        let diarized = match self.diarization.diarize(&audio).await {
            Ok(r) => r,
            Err(e) => {
                warn!(meeting_id, error = %e, "diarization call failed");
                return DiarizationOutcome::Failed(e.to_string());
            }
        };
        info!(meeting_id, speaker_count = diarized.speaker_count, provider = diarized.provider, "diarization completed");

        if self.is_stopped(meeting_id).await {
            return DiarizationOutcome::Stopped;
        }

        let transcript_inputs = match self.asr.transcribe_full(audio).await {
            Ok(full) if !full.segments.is_empty() => full
                .segments
                .into_iter()
                .map(|s| TranscriptInput {
                    id: None,
                    text: s.text,
                    audio_start_time: s.start,
                    audio_end_time: s.end,
                    original_text: None,
                    translated: None,
                })
                .collect(),
            // Reference transcription unavailable or empty: fall back to
            // the diarization provider's own per-segment text (spec §4.8
            // "the segments embedded in the diarization result").
            _ => diarized
                .segments
                .iter()
                .map(|s| TranscriptInput {
                    id: None,
                    text: s.text.clone(),
                    audio_start_time: s.start_time,
                    audio_end_time: s.end_time,
                    original_text: None,
                    translated: None,
                })
                .collect(),
        };

        if self.is_stopped(meeting_id).await {
            return DiarizationOutcome::Stopped;
        }

        let (aligned, _metrics) = self.alignment.align_batch(&transcript_inputs, &diarized.segments);

        match self
            .versions
            .save_version(meeting_id, TranscriptSource::Diarized, aligned, true, None)
            .await
        {
            Ok(version_num) => DiarizationOutcome::Completed {
                version_num,
                speaker_count: diarized.speaker_count,
            },
            Err(e) => {
                warn!(meeting_id, error = %e, "failed to persist diarized version");
                DiarizationOutcome::Failed(e.to_string())
            }
        }
    }

    /// Audio resolution order (spec §4.7): existing merged container file,
    /// then the merged PCM reconstructed from chunks.
    async fn resolve_audio(&self, meeting_id: &str) -> Option<Vec<u8>> {
        if let Ok(bytes) = self.store.get(&format!("{meeting_id}/recording.wav")).await {
            return Some(bytes);
        }

        let merged = AudioRecorder::merge_chunks(self.store.as_ref(), meeting_id, &self.config.chunk_prefix)
            .await
            .ok()?;
        if merged.is_empty() {
            return None;
        }
        pcm_to_wav(&merged, SAMPLE_RATE_HZ).ok()
    }

    async fn is_stopped(&self, meeting_id: &str) -> bool {
        matches!(self.jobs.status(meeting_id).await, Ok(Some(DiarizationJobStatus::Stopped)))
    }
}
