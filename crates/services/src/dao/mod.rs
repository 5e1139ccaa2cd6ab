pub mod base;
pub mod diarization_job;
pub mod meeting;
pub mod transcript_segment;

pub use base::{BaseDao, DaoError, DaoResult};
pub use diarization_job::DiarizationJobDao;
pub use meeting::MeetingDao;
pub use transcript_segment::TranscriptSegmentDao;
