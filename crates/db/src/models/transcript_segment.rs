use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Durable row for a single live `FinalSegment`, written as C1 emits it
/// (spec §6 persistence contract) — independent of, and prior to, the
/// versioned diarized transcript produced later by C6–C9.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegmentRecord {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub meeting_id: String,
    pub text: String,
    pub timestamp: DateTime,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_alignment_state")]
    pub alignment_state: String,
    pub audio_start_time: f64,
}

fn default_source() -> String {
    "live".to_string()
}

fn default_alignment_state() -> String {
    "CONFIDENT".to_string()
}

impl TranscriptSegmentRecord {
    pub const COLLECTION: &'static str = "transcript_segments";
}
