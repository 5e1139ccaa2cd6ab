use mongodb::{options::IndexOptions, Database, IndexModel};
use tracing::info;

use crate::models::{DiarizationJob, Meeting, TranscriptSegmentRecord, TranscriptVersion};

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    create_indexes(
        db,
        Meeting::COLLECTION,
        vec![index_unique(bson::doc! { "meeting_id": 1 })],
    )
    .await?;

    create_indexes(
        db,
        TranscriptSegmentRecord::COLLECTION,
        vec![index(bson::doc! { "meeting_id": 1, "audio_start_time": 1 })],
    )
    .await?;

    create_indexes(
        db,
        TranscriptVersion::COLLECTION,
        vec![
            index_unique(bson::doc! { "meeting_id": 1, "version_num": 1 }),
            index(bson::doc! { "meeting_id": 1, "is_authoritative": 1 }),
        ],
    )
    .await?;

    create_indexes(
        db,
        DiarizationJob::COLLECTION,
        vec![index_unique(bson::doc! { "meeting_id": 1 })],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    let coll = db.collection::<bson::Document>(collection);
    match coll.create_indexes(indexes.clone()).await {
        Ok(_) => {
            info!(collection, "Indexes created");
            Ok(())
        }
        Err(e) => {
            if let mongodb::error::ErrorKind::Command(ref cmd_err) = *e.kind {
                if cmd_err.code == 86 {
                    tracing::warn!(
                        collection,
                        "Index conflict detected, dropping conflicting indexes and retrying"
                    );
                    coll.drop_indexes().await?;
                    coll.create_indexes(indexes).await?;
                    info!(collection, "Indexes recreated after conflict resolution");
                    return Ok(());
                }
            }
            Err(e)
        }
    }
}
