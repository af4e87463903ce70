mod logic;
pub(crate) mod archive;
pub(crate) mod db_dump;

use anyhow::{Context, Result};
use chrono::Local;

use crate::config::AppConfig;
use crate::storage::Storage;
use crate::utils::process::SystemProcessRunner;

pub use logic::{BackupPipeline, BackupReport};

/// Public entry point for the backup action: dumps `src.db` and stores the
/// compressed artifact in the configured storage.
pub async fn run_backup_flow(app_config: &AppConfig, verbose: bool) -> Result<BackupReport> {
    let storage = Storage::from_config(app_config)
        .await
        .context("Failed to open backup storage")?;
    let runner = SystemProcessRunner;

    let mut pipeline = BackupPipeline::new(
        &runner,
        &storage,
        &app_config.source,
        &app_config.temporary_path,
    )
    .dump_command(&app_config.dump_command)
    .step_timeout(app_config.command_timeout)
    .verbose(verbose);

    let report = pipeline
        .run(Local::now().naive_local())
        .await
        .with_context(|| format!("Backup of database '{}' failed", app_config.source.database))?;
    Ok(report)
}
