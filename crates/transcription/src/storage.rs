//! Storage collaborator abstraction (spec §6 "Object storage"). Local
//! filesystem is the default; a GCS-backed implementation is provided for
//! the `STORAGE_TYPE=gcp` deployment mode described in
//! `examples/original_source/backend/app/services/storage.py`.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upload failed: {0}")]
    UploadFailed(String),
    #[error("object not found: {0}")]
    NotFound(String),
}

/// Byte-blob storage keyed by a relative path, abstracting over local disk
/// and cloud object storage (spec §6).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, relative_path: &str, data: Vec<u8>) -> Result<(), StorageError>;
    async fn get(&self, relative_path: &str) -> Result<Vec<u8>, StorageError>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
    async fn delete_prefix(&self, prefix: &str) -> Result<(), StorageError>;
}

pub struct LocalFsStore {
    root: PathBuf,
}

impl LocalFsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, relative_path: &str) -> PathBuf {
        self.root.join(relative_path)
    }
}

#[async_trait]
impl ObjectStore for LocalFsStore {
    async fn put(&self, relative_path: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let path = self.resolve(relative_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn get(&self, relative_path: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(relative_path);
        tokio::fs::read(&path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    StorageError::NotFound(relative_path.to_string())
                } else {
                    StorageError::Io(e)
                }
            })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let dir = self.resolve(prefix);
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(StorageError::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                out.push(format!("{prefix}/{name}"));
            }
        }
        out.sort();
        Ok(out)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StorageError> {
        let dir = self.resolve(prefix);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

/// Thin GCS JSON API client. Credentials and bucket come from
/// `scribeline_config::Settings`; kept minimal since diarization-provider
/// uploads are the only cloud path the spec requires.
pub struct GcsStore {
    bucket: String,
    client: reqwest::Client,
    access_token: String,
}

impl GcsStore {
    pub fn new(bucket: String, access_token: String) -> Self {
        Self {
            bucket,
            client: reqwest::Client::new(),
            access_token,
        }
    }

    fn object_url(&self, relative_path: &str) -> String {
        let encoded = urlencoding_minimal(relative_path);
        format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o?uploadType=media&name={encoded}",
            self.bucket
        )
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(&self, relative_path: &str, data: Vec<u8>) -> Result<(), StorageError> {
        let url = self.object_url(relative_path);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;

        if !resp.status().is_success() {
            warn!(status = %resp.status(), "gcs upload failed");
            return Err(StorageError::UploadFailed(format!("status {}", resp.status())));
        }
        info!(relative_path, "uploaded object to gcs");
        Ok(())
    }

    async fn get(&self, relative_path: &str) -> Result<Vec<u8>, StorageError> {
        let encoded = urlencoding_minimal(relative_path);
        let url = format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o/{encoded}?alt=media",
            self.bucket
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(relative_path.to_string()));
        }
        if !resp.status().is_success() {
            return Err(StorageError::UploadFailed(format!("status {}", resp.status())));
        }
        Ok(resp.bytes().await.map_err(|e| StorageError::UploadFailed(e.to_string()))?.to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let url = format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o?prefix={}",
            self.bucket,
            urlencoding_minimal(prefix)
        );
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        let names = body["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|i| i["name"].as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        Ok(names)
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<(), StorageError> {
        for name in self.list(prefix).await? {
            let url = format!(
                "https://storage.googleapis.com/storage/v1/b/{}/o/{}",
                self.bucket,
                urlencoding_minimal(&name)
            );
            let _ = self.client.delete(&url).bearer_auth(&self.access_token).send().await;
        }
        Ok(())
    }
}

fn urlencoding_minimal(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => c.to_string(),
            '/' => "%2F".to_string(),
            other => format!("%{:02X}", other as u32),
        })
        .collect()
}
