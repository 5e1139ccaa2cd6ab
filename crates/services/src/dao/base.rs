//! Generic MongoDB access layer shared by every DAO in this crate. Mirrors
//! the teacher's `dao::base::BaseDao<T>` (referenced throughout
//! `dao/role.rs`, `dao/invite.rs`, `dao/user.rs`, ... but not itself part
//! of the retrieved file set) — reconstructed here from those call sites.

use bson::{doc, oid::ObjectId, Document};
use futures::stream::TryStreamExt;
use mongodb::{options::FindOptions, Collection, Database};
use serde::{de::DeserializeOwned, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum DaoError {
    #[error("not found")]
    NotFound,
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("mongo error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

pub type DaoResult<T> = Result<T, DaoError>;

/// Thin wrapper around a single typed `mongodb::Collection`, providing the
/// handful of operations every DAO in this crate needs.
pub struct BaseDao<T> {
    collection: Collection<T>,
}

impl<T> Clone for BaseDao<T> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
        }
    }
}

impl<T> BaseDao<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    pub fn new(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection(collection_name),
        }
    }

    pub fn collection(&self) -> &Collection<T> {
        &self.collection
    }

    pub async fn insert_one(&self, doc: &T) -> DaoResult<ObjectId> {
        let result = self.collection.insert_one(doc).await.map_err(map_insert_err)?;
        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| DaoError::Validation("insert did not return an ObjectId".to_string()))
    }

    pub async fn find_by_id(&self, id: ObjectId) -> DaoResult<T> {
        self.collection
            .find_one(doc! { "_id": id })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn find_one(&self, filter: Document) -> DaoResult<Option<T>> {
        Ok(self.collection.find_one(filter).await?)
    }

    pub async fn find_many(&self, filter: Document, sort: Option<Document>) -> DaoResult<Vec<T>> {
        let mut options = FindOptions::default();
        options.sort = sort;
        let cursor = self.collection.find(filter).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn update_one(&self, filter: Document, update: Document) -> DaoResult<bool> {
        let result = self.collection.update_one(filter, update).await?;
        Ok(result.modified_count > 0)
    }

    pub async fn delete_one(&self, filter: Document) -> DaoResult<bool> {
        let result = self.collection.delete_one(filter).await?;
        Ok(result.deleted_count > 0)
    }

    pub async fn count(&self, filter: Document) -> DaoResult<u64> {
        Ok(self.collection.count_documents(filter).await?)
    }
}

fn map_insert_err(e: mongodb::error::Error) -> DaoError {
    if let mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we)) =
        *e.kind
    {
        if we.code == 11000 {
            return DaoError::DuplicateKey(we.message.clone());
        }
    }
    DaoError::Mongo(e)
}
