// pgmanager/src/storage/local.rs
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::StorageBackend;
use crate::errors::{AppError, Result};
use crate::utils::discard_scratch_file;

const PARTIAL_SUFFIX: &str = ".partial";

/// Backups kept as plain files in one directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Opens the storage directory, creating it if needed.
    pub fn open(root: &Path) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        // leading dots are reserved for in-progress copies
        let is_plain_name =
            !key.is_empty() && !key.starts_with('.') && !key.contains(['/', '\\']);
        if !is_plain_name {
            return Err(AppError::InvalidInput(format!(
                "local storage key must be a plain file name: {:?}",
                key
            )));
        }
        Ok(self.root.join(key))
    }

    /// Copies `source` to `.{key}.partial` and renames that to `key`, so the
    /// key only ever names a complete file. The partial file is removed on
    /// any error.
    async fn copy_into_place(&self, source: &Path, key: &str) -> Result<()> {
        let destination = self.path_for(key)?;
        let partial = self.root.join(format!(".{}{}", key, PARTIAL_SUFFIX));
        let copied = async {
            tokio::fs::copy(source, &partial).await?;
            tokio::fs::rename(&partial, &destination).await
        }
        .await;
        if let Err(e) = copied {
            discard_scratch_file(&partial);
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut keys = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if name.starts_with(prefix) {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn put(&self, local_path: &Path, key: &str) -> Result<()> {
        let destination = self.path_for(key)?;
        if let Err(e) = tokio::fs::rename(local_path, &destination).await {
            // rename cannot cross filesystems; copy then remove instead
            debug!(error = %e, "rename into local storage failed, copying");
            self.copy_into_place(local_path, key).await?;
            discard_scratch_file(local_path);
        }
        info!(
            "✓ Moved {} to {}",
            local_path.display(),
            destination.display()
        );
        Ok(())
    }

    async fn get(&self, key: &str, local_path: &Path) -> Result<()> {
        let source = self.path_for(key)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(AppError::NotFound(key.to_string()));
        }
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&source, local_path).await?;
        info!("✓ Copied {} to {}", source.display(), local_path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("local:{}", self.root.display())
    }
}
