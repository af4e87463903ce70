// pgmanager/src/restore/catalog.rs
use tracing::{debug, info};

use crate::errors::{AppError, Result};
use crate::storage::StorageBackend;

/// The stored backups, newest first. Keys start with
/// `backup-{YYYYMMDD-HHMMSS}`, so descending key order is newest first.
pub struct BackupCatalog<'a> {
    storage: &'a dyn StorageBackend,
}

impl<'a> BackupCatalog<'a> {
    pub fn new(storage: &'a dyn StorageBackend) -> Self {
        Self { storage }
    }

    pub async fn entries(&self) -> Result<Vec<String>> {
        let mut keys = self.storage.list("").await?;
        keys.sort_unstable_by(|a, b| b.cmp(a));
        Ok(keys)
    }

    /// Picks the newest backup whose key contains `selector`.
    ///
    /// The selector is a plain substring, not a parsed date: `2023` matches
    /// every backup of that year and resolves to the latest one.
    pub async fn resolve(&self, selector: &str) -> Result<String> {
        if selector.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "No date was chosen for restore. Run the list action to see available backups"
                    .to_string(),
            ));
        }
        let entries = self.entries().await?;
        match newest_match(&entries, selector) {
            Some(key) => {
                info!("Found backup {} for '{}'", key, selector);
                Ok(key.to_string())
            }
            None => {
                debug!(available = ?entries, "no backup key matched");
                Err(AppError::NoBackupFound(selector.to_string()))
            }
        }
    }
}

/// Lexicographically greatest key containing `selector`.
pub fn newest_match<'k>(keys: &'k [String], selector: &str) -> Option<&'k str> {
    keys.iter()
        .filter(|key| key.contains(selector))
        .max()
        .map(String::as_str)
}
