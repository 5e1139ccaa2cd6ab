pub mod indexes;
pub mod models;

use mongodb::{Client, Database};
use scribeline_config::Settings;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// Connects to MongoDB and ensures the collections used by the core have
/// their indexes in place. Called once from the `scribeline-api` binary's
/// startup.
pub async fn connect(settings: &Settings) -> Result<Database, DbError> {
    let client = Client::with_uri_str(&settings.mongodb_uri).await?;
    let db = client.database(&settings.mongodb_db_name);
    indexes::ensure_indexes(&db).await?;
    Ok(db)
}
