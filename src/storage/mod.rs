//! Backup artifact storage.
//!
//! Keys are always relative to the backend root: the local directory, or
//! the bucket path prefix for S3.

pub mod local;
pub mod s3;

use std::path::Path;

use async_trait::async_trait;

use crate::config::{AppConfig, StorageConfig};
use crate::errors::Result;

pub use local::LocalStorage;
pub use s3::S3Storage;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Keys starting with `prefix`, ascending.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Stores `local_path` under `key`. On success the local file is gone.
    async fn put(&self, local_path: &Path, key: &str) -> Result<()>;

    /// Writes the content stored under `key` to `local_path`. A missing key
    /// is [`crate::errors::AppError::NotFound`].
    async fn get(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Human readable location for log lines.
    fn describe(&self) -> String;
}

/// The configured backend, chosen once from `setup.engine`.
pub enum Storage {
    Local(LocalStorage),
    S3(S3Storage),
}

impl Storage {
    pub async fn from_config(app_config: &AppConfig) -> Result<Self> {
        match &app_config.storage {
            StorageConfig::Local { path } => Ok(Storage::Local(LocalStorage::open(path)?)),
            StorageConfig::S3(s3_config) => Ok(Storage::S3(S3Storage::connect(s3_config).await)),
        }
    }

    fn backend(&self) -> &dyn StorageBackend {
        match self {
            Storage::Local(local) => local,
            Storage::S3(s3) => s3,
        }
    }
}

#[async_trait]
impl StorageBackend for Storage {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.backend().list(prefix).await
    }

    async fn put(&self, local_path: &Path, key: &str) -> Result<()> {
        self.backend().put(local_path, key).await
    }

    async fn get(&self, key: &str, local_path: &Path) -> Result<()> {
        self.backend().get(key, local_path).await
    }

    fn describe(&self) -> String {
        self.backend().describe()
    }
}
