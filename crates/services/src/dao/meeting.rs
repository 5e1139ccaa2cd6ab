use bson::{doc, DateTime};
use mongodb::Database;
use scribeline_db::models::Meeting;

use super::base::{BaseDao, DaoResult};

/// Upserts the minimal durable meeting record a streaming session touches
/// (spec §4.1 step 2, "Ensure a meeting record exists").
pub struct MeetingDao {
    base: BaseDao<Meeting>,
}

impl MeetingDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Meeting::COLLECTION),
        }
    }

    pub async fn touch(&self, meeting_id: &str) -> DaoResult<()> {
        let now = DateTime::now();
        let updated = self
            .base
            .update_one(
                doc! { "meeting_id": meeting_id },
                doc! { "$set": { "last_activity_at": now } },
            )
            .await?;

        if !updated {
            let meeting = Meeting {
                id: None,
                meeting_id: meeting_id.to_string(),
                created_at: now,
                last_activity_at: now,
            };
            match self.base.insert_one(&meeting).await {
                Ok(_) | Err(super::base::DaoError::DuplicateKey(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}
