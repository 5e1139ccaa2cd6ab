use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Minimal durable record for a meeting id seen by a streaming session.
/// Upserted on session accept (spec §4.1 step 2); the broader meeting
/// CRUD surface (settings, participants, ...) is an external collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meeting {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub meeting_id: String,
    pub created_at: DateTime,
    pub last_activity_at: DateTime,
}

impl Meeting {
    pub const COLLECTION: &'static str = "meetings";
}
