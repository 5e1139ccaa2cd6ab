use std::collections::BTreeMap;

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// A `FinalSegment` extended with a speaker label, confidence, and
/// alignment state (spec §3 `AlignedTranscriptSegment`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignedTranscriptSegment {
    #[serde(default)]
    pub id: String,
    pub text: String,
    pub confidence: f64,
    pub reason: String,
    pub audio_start_time: f64,
    pub audio_end_time: f64,
    pub duration: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated: Option<bool>,
    pub speaker: String,
    pub speaker_confidence: f64,
    pub alignment_method: String,
    pub alignment_state: String,
}

/// Aggregate confidence breakdown stored alongside a version, derived
/// purely from its `content` (spec §4.9 `saveVersion`, §4.8 `alignBatch`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfidenceMetrics {
    pub total: u64,
    pub avg_confidence: f64,
    pub confident_count: u64,
    pub uncertain_count: u64,
    pub overlap_count: u64,
    pub unknown_count: u64,
    /// Per-`alignment_method` counts (e.g. `"time_overlap" -> 3`).
    pub method_breakdown: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptSource {
    Live,
    Diarized,
    ManualEdit,
}

/// Immutable per-meeting transcript snapshot (spec §3 `TranscriptVersion`).
/// Version numbers are dense, start at 1, and at most one row per
/// `meeting_id` has `is_authoritative = true` (enforced by C9's
/// `saveVersion`, not by a unique index, since the flag legitimately moves
/// between rows over time).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptVersion {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub meeting_id: String,
    pub version_num: u64,
    pub source: TranscriptSource,
    pub content: Vec<AlignedTranscriptSegment>,
    pub is_authoritative: bool,
    pub created_at: DateTime,
    pub created_by: Option<String>,
    pub confidence_metrics: ConfidenceMetrics,
}

impl TranscriptVersion {
    pub const COLLECTION: &'static str = "transcript_versions";
}
