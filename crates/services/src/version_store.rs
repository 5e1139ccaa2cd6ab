//! C9 — the authoritative record of transcript history for a meeting.
//! Version numbers are dense and start at 1; at most one version per
//! meeting is ever `is_authoritative`. Confidence metrics are derived
//! purely from `content`, never accepted from a caller (spec §4.9).

use bson::doc;
use mongodb::Database;
use thiserror::Error;

use scribeline_db::models::{
    AlignedTranscriptSegment, ConfidenceMetrics, TranscriptSource, TranscriptVersion,
};

use crate::dao::{BaseDao, DaoError};

#[derive(Debug, Error)]
pub enum VersionStoreError {
    #[error("version not found")]
    NotFound,
    #[error("database error: {0}")]
    Dao(#[from] DaoError),
    #[error("transaction error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

pub struct VersionStore {
    db: Database,
    dao: BaseDao<TranscriptVersion>,
}

impl VersionStore {
    pub fn new(db: Database) -> Self {
        let dao = BaseDao::new(&db, TranscriptVersion::COLLECTION);
        Self { db, dao }
    }

    fn compute_metrics(content: &[AlignedTranscriptSegment]) -> ConfidenceMetrics {
        let mut metrics = ConfidenceMetrics {
            total: content.len() as u64,
            ..Default::default()
        };
        if content.is_empty() {
            return metrics;
        }

        let mut total_confidence = 0.0;
        for seg in content {
            total_confidence += seg.confidence;
            match seg.alignment_state.as_str() {
                "CONFIDENT" => metrics.confident_count += 1,
                "OVERLAP" => metrics.overlap_count += 1,
                "UNKNOWN_SPEAKER" => metrics.unknown_count += 1,
                _ => metrics.uncertain_count += 1,
            }
            *metrics.method_breakdown.entry(seg.alignment_method.clone()).or_insert(0) += 1;
        }
        metrics.avg_confidence = total_confidence / content.len() as f64;
        metrics
    }

    /// Inserts a new version and, if `is_authoritative` is requested,
    /// atomically demotes the previously-authoritative version first
    /// (both writes run inside one MongoDB session/transaction so a crash
    /// between them can never leave two rows authoritative at once).
    pub async fn save_version(
        &self,
        meeting_id: &str,
        source: TranscriptSource,
        content: Vec<AlignedTranscriptSegment>,
        is_authoritative: bool,
        created_by: Option<String>,
    ) -> Result<u64, VersionStoreError> {
        let confidence_metrics = Self::compute_metrics(&content);

        let existing = self
            .dao
            .find_many(doc! { "meeting_id": meeting_id }, Some(doc! { "version_num": -1 }))
            .await?;
        let next_version = existing.first().map(|v| v.version_num + 1).unwrap_or(1);

        let version = TranscriptVersion {
            id: None,
            meeting_id: meeting_id.to_string(),
            version_num: next_version,
            source,
            content,
            is_authoritative,
            created_at: bson::DateTime::now(),
            created_by,
            confidence_metrics,
        };

        let mut session = self.db.client().start_session().await?;
        session.start_transaction().await?;

        let result = async {
            if is_authoritative {
                self.db
                    .collection::<TranscriptVersion>(TranscriptVersion::COLLECTION)
                    .update_many(doc! { "meeting_id": meeting_id, "is_authoritative": true }, doc! { "$set": { "is_authoritative": false } })
                    .session(&mut session)
                    .await?;
            }
            self.db
                .collection::<TranscriptVersion>(TranscriptVersion::COLLECTION)
                .insert_one(&version)
                .session(&mut session)
                .await?;
            Ok::<(), mongodb::error::Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                session.commit_transaction().await?;
                Ok(next_version)
            }
            Err(e) => {
                let _ = session.abort_transaction().await;
                Err(VersionStoreError::Mongo(e))
            }
        }
    }

    pub async fn list_versions(&self, meeting_id: &str) -> Result<Vec<TranscriptVersion>, VersionStoreError> {
        Ok(self
            .dao
            .find_many(doc! { "meeting_id": meeting_id }, Some(doc! { "version_num": 1 }))
            .await?)
    }

    pub async fn get_version_content(
        &self,
        meeting_id: &str,
        version_num: u64,
    ) -> Result<Vec<AlignedTranscriptSegment>, VersionStoreError> {
        let version = self
            .dao
            .find_one(doc! { "meeting_id": meeting_id, "version_num": version_num as i64 })
            .await?
            .ok_or(VersionStoreError::NotFound)?;
        Ok(version.content)
    }

    pub async fn get_authoritative(
        &self,
        meeting_id: &str,
    ) -> Result<Option<TranscriptVersion>, VersionStoreError> {
        Ok(self
            .dao
            .find_one(doc! { "meeting_id": meeting_id, "is_authoritative": true })
            .await?)
    }

    /// Deletes a version. Deleting the authoritative version leaves the
    /// meeting with none until a new `save_version(is_authoritative=true)`
    /// call is made — callers (the finalizer, manual edits) are expected to
    /// promote a replacement in the same operation where that matters.
    pub async fn delete_version(&self, meeting_id: &str, version_num: u64) -> Result<bool, VersionStoreError> {
        Ok(self
            .dao
            .delete_one(doc! { "meeting_id": meeting_id, "version_num": version_num as i64 })
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_on_empty_content_are_zeroed() {
        let metrics = VersionStore::compute_metrics(&[]);
        assert_eq!(metrics.total, 0);
        assert_eq!(metrics.avg_confidence, 0.0);
    }

    #[test]
    fn metrics_bucket_by_alignment_state() {
        let content = vec![
            AlignedTranscriptSegment {
                id: "1".into(),
                text: "hi".into(),
                confidence: 0.9,
                reason: String::new(),
                audio_start_time: 0.0,
                audio_end_time: 1.0,
                duration: 1.0,
                original_text: None,
                translated: None,
                speaker: "Speaker 0".into(),
                speaker_confidence: 0.9,
                alignment_method: "time_overlap".into(),
                alignment_state: "CONFIDENT".into(),
            },
            AlignedTranscriptSegment {
                id: "2".into(),
                text: "there".into(),
                confidence: 0.4,
                reason: String::new(),
                audio_start_time: 1.0,
                audio_end_time: 2.0,
                duration: 1.0,
                original_text: None,
                translated: None,
                speaker: "Speaker 1".into(),
                speaker_confidence: 0.4,
                alignment_method: "uncertain".into(),
                alignment_state: "UNCERTAIN".into(),
            },
        ];
        let metrics = VersionStore::compute_metrics(&content);
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.confident_count, 1);
        assert_eq!(metrics.uncertain_count, 1);
        assert!((metrics.avg_confidence - 0.65).abs() < 1e-9);
        assert_eq!(metrics.method_breakdown.get("time_overlap"), Some(&1));
        assert_eq!(metrics.method_breakdown.get("uncertain"), Some(&1));
    }
}
