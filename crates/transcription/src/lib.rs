pub mod asr;
pub mod buffer;
pub mod config;
pub mod manager;
pub mod recorder;
pub mod storage;
pub mod vad;
pub mod wav;

pub use asr::{
    AsrBackend, AsrError, AsrRequest, FullTranscription, HttpAsrBackend, TranscriptSegment,
    TranscriptionResult,
};
pub use buffer::RollingBuffer;
pub use config::{RecorderConfig, StreamingConfig};
pub use manager::{FinalSegment, ManagerErrorCode, ManagerEvent, StreamingTranscriptionManager, TriggerReason};
pub use recorder::{AudioRecorder, ChunkInfo, RecorderError, RecordingSummary};
pub use storage::{GcsStore, LocalFsStore, ObjectStore, StorageError};
pub use vad::{VadBackend, VadModelPaths};
pub use wav::{pcm_to_wav, wav_to_pcm, SAMPLE_RATE_HZ};
