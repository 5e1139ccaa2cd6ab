use bson::{doc, DateTime};
use mongodb::Database;
use scribeline_db::models::TranscriptSegmentRecord;

use super::base::{BaseDao, DaoResult};

/// Durable row per live `FinalSegment` (spec §6 persistence contract),
/// written by C1 as it relays each `FinalSegment` from C4.
pub struct TranscriptSegmentDao {
    base: BaseDao<TranscriptSegmentRecord>,
}

impl TranscriptSegmentDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, TranscriptSegmentRecord::COLLECTION),
        }
    }

    pub async fn record(&self, meeting_id: &str, text: &str, audio_start_time: f64) -> DaoResult<()> {
        let record = TranscriptSegmentRecord {
            id: None,
            meeting_id: meeting_id.to_string(),
            text: text.to_string(),
            timestamp: DateTime::now(),
            source: "live".to_string(),
            alignment_state: "CONFIDENT".to_string(),
            audio_start_time,
        };
        self.base.insert_one(&record).await?;
        Ok(())
    }

    pub async fn list_for_meeting(&self, meeting_id: &str) -> DaoResult<Vec<TranscriptSegmentRecord>> {
        self.base
            .find_many(doc! { "meeting_id": meeting_id }, Some(doc! { "audio_start_time": 1 }))
            .await
    }
}
