mod diarization_job;
mod meeting;
mod transcript_segment;
mod transcript_version;

pub use diarization_job::{DiarizationJob, DiarizationJobStatus};
pub use meeting::Meeting;
pub use transcript_segment::TranscriptSegmentRecord;
pub use transcript_version::{
    AlignedTranscriptSegment, ConfidenceMetrics, TranscriptSource, TranscriptVersion,
};
