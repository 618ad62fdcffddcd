//! Blob storage for uploaded images and book files. Records keep only the returned key.

use crate::error::AppError;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use std::path::{Component, Path, PathBuf};

#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store `bytes` under `key`; returns the key recorded on the record.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, AppError>;
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

/// Storage key for an upload: `{prefix}{uuid}_{sanitised file name}`.
pub fn object_key(prefix: &str, file_name: Option<&str>) -> String {
    let name: String = file_name
        .and_then(|n| Path::new(n).file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("upload")
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    format!("{}{}_{}", prefix, uuid::Uuid::new_v4().simple(), name)
}

/// Files under a media root directory.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalStorage { root: root.into() }
    }

    /// Resolve a key under the root. Keys may not escape it.
    fn path_for(&self, key: &str) -> Result<PathBuf, AppError> {
        let rel = Path::new(key);
        if rel.components().any(|c| !matches!(c, Component::Normal(_))) {
            return Err(AppError::BadRequest(format!("invalid storage key: {}", key)));
        }
        Ok(self.root.join(rel))
    }
}

#[async_trait]
impl BlobStorage for LocalStorage {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, AppError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AppError::Storage(format!("{}: {}", path.display(), e)))?;
        tracing::info!(key, size = bytes.len(), "stored upload");
        Ok(key.to_string())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Storage(format!("{}: {}", path.display(), e))),
        }
    }
}

/// Objects in one S3 bucket.
#[derive(Clone, Debug)]
pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        S3Storage {
            client,
            bucket: bucket.into(),
        }
    }

    /// Client from the default AWS environment (region, credentials chain).
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        S3Storage::new(aws_sdk_s3::Client::new(&config), bucket)
    }
}

#[async_trait]
impl BlobStorage for S3Storage {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, AppError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("s3 put {}: {}", key, e)))?;
        tracing::info!(bucket = %self.bucket, key, size, "stored upload");
        Ok(key.to_string())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("s3 delete {}: {}", key, e)))?;
        Ok(())
    }
}
