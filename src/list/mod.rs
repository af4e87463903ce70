// pgmanager/src/list/mod.rs
use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::database::{DatabaseAdmin, PostgresAdmin};
use crate::restore::BackupCatalog;
use crate::storage::{Storage, StorageBackend};

/// Stored backup keys, newest first.
pub async fn list_backups(storage: &dyn StorageBackend) -> Result<Vec<String>> {
    BackupCatalog::new(storage)
        .entries()
        .await
        .with_context(|| format!("Failed to list backups in {}", storage.describe()))
}

/// Databases on the destination server.
pub async fn list_databases(admin: &dyn DatabaseAdmin) -> Result<Vec<String>> {
    admin
        .list_databases()
        .await
        .context("Failed to list databases")
}

pub async fn run_list_flow(app_config: &AppConfig) -> Result<Vec<String>> {
    let storage = Storage::from_config(app_config)
        .await
        .context("Failed to open backup storage")?;
    list_backups(&storage).await
}

pub async fn run_list_dbs_flow(app_config: &AppConfig) -> Result<Vec<String>> {
    let admin = PostgresAdmin::new(&app_config.destination, &app_config.maintenance_db);
    list_databases(&admin).await
}
