use bson::{doc, Bson, DateTime};
use mongodb::Database;
use scribeline_db::models::{DiarizationJob, DiarizationJobStatus};

use super::base::DaoError;

pub type DaoResult<T> = Result<T, DaoError>;

/// Per-meeting diarization job status, backed by the unique index on
/// `meeting_id` (spec §5 "at most 1 diarization job per meeting at a
/// time"). Not a job history table — one row per meeting, overwritten on
/// each run.
pub struct DiarizationJobDao {
    collection: mongodb::Collection<DiarizationJob>,
}

impl DiarizationJobDao {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection(DiarizationJob::COLLECTION),
        }
    }

    /// Claims the job slot for `meeting_id`. The filter excludes rows
    /// already `running`, so a concurrent claim either matches-and-updates
    /// a finished row or collides with the unique index on insert — the
    /// index is what actually prevents two concurrent runs, not the
    /// read-then-write race this method's filter alone would allow.
    /// Returns `Ok(false)` when a run is already in progress.
    pub async fn try_start(&self, meeting_id: &str, provider: &str) -> DaoResult<bool> {
        let now = DateTime::now();
        let filter = doc! { "meeting_id": meeting_id, "status": { "$ne": "running" } };
        let update = doc! { "$set": {
            "meeting_id": meeting_id,
            "status": "running",
            "provider": provider,
            "started_at": now,
            "finished_at": Bson::Null,
            "error": Bson::Null,
        }};

        match self.collection.update_one(filter, update).upsert(true).await {
            Ok(result) => Ok(result.matched_count > 0 || result.upserted_id.is_some()),
            Err(e) => {
                if is_duplicate_key(&e) {
                    Ok(false)
                } else {
                    Err(DaoError::Mongo(e))
                }
            }
        }
    }

    pub async fn complete(&self, meeting_id: &str) -> DaoResult<()> {
        self.collection
            .update_one(
                doc! { "meeting_id": meeting_id },
                doc! { "$set": { "status": "completed", "finished_at": DateTime::now() } },
            )
            .await?;
        Ok(())
    }

    pub async fn fail(&self, meeting_id: &str, error: &str) -> DaoResult<()> {
        self.collection
            .update_one(
                doc! { "meeting_id": meeting_id },
                doc! { "$set": { "status": "failed", "finished_at": DateTime::now(), "error": error } },
            )
            .await?;
        Ok(())
    }

    /// Marks a running job `stopped`; the pipeline checks for this between
    /// stages and exits without persisting results (spec §7 "Diarization
    /// cancellation").
    pub async fn request_stop(&self, meeting_id: &str) -> DaoResult<bool> {
        let result = self
            .collection
            .update_one(
                doc! { "meeting_id": meeting_id, "status": "running" },
                doc! { "$set": { "status": "stopped", "finished_at": DateTime::now() } },
            )
            .await?;
        Ok(result.modified_count > 0)
    }

    pub async fn status(&self, meeting_id: &str) -> DaoResult<Option<DiarizationJobStatus>> {
        Ok(self
            .collection
            .find_one(doc! { "meeting_id": meeting_id })
            .await?
            .map(|j| j.status))
    }
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we)) = *e.kind {
        return we.code == 11000;
    }
    false
}
