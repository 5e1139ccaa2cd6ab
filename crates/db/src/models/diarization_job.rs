use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiarizationJobStatus {
    Running,
    Completed,
    Failed,
    Stopped,
}

/// Tracks an in-flight diarization job so at most one runs per meeting at
/// a time (spec §5 "Resource budgets"); a unique index on `meeting_id`
/// enforces this (see `indexes::ensure_indexes`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiarizationJob {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub meeting_id: String,
    pub status: DiarizationJobStatus,
    pub provider: String,
    pub started_at: DateTime,
    pub finished_at: Option<DateTime>,
    pub error: Option<String>,
}

impl DiarizationJob {
    pub const COLLECTION: &'static str = "diarization_jobs";
}
