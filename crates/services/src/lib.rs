pub mod alignment;
pub mod dao;
pub mod diarization;
pub mod diarization_pipeline;
pub mod finalizer;
pub mod version_store;

pub use alignment::{AlignmentEngine, AlignmentMethod, AlignmentState, TranscriptInput};
pub use dao::{BaseDao, DaoError, DaoResult, DiarizationJobDao, MeetingDao, TranscriptSegmentDao};
pub use diarization::{
    AssemblyAiProvider, DeepgramProvider, DiarizationError, DiarizationResult, DiarizationService,
    SpeakerSegment,
};
pub use diarization_pipeline::{DiarizationOutcome, DiarizationPipeline, DiarizationPipelineConfig};
pub use finalizer::{FinalizeReport, FinalizeStatus, Finalizer, FinalizerConfig};
pub use version_store::{VersionStore, VersionStoreError};
