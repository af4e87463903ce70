mod logic;
pub(crate) mod catalog;
pub(crate) mod db_restore;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::AppConfig;
use crate::database::PostgresAdmin;
use crate::storage::Storage;
use crate::utils::process::SystemProcessRunner;

pub use catalog::BackupCatalog;
pub use logic::{RestorePipeline, RestoreReport};

/// Public entry point for the restore action: restores the newest backup
/// matching `selector` into `dest_db`, or into `dest.db` when no override is
/// given.
pub async fn run_restore_flow(
    app_config: &AppConfig,
    selector: &str,
    dest_db: Option<&str>,
    verbose: bool,
) -> Result<RestoreReport> {
    let target = dest_db.unwrap_or(&app_config.destination.database);
    info!(
        "Restore target: {} on {}:{}",
        target, app_config.destination.host, app_config.destination.port
    );

    let storage = Storage::from_config(app_config)
        .await
        .context("Failed to open backup storage")?;
    let admin = PostgresAdmin::new(&app_config.destination, &app_config.maintenance_db);
    let runner = SystemProcessRunner;

    let mut pipeline = RestorePipeline::new(
        &runner,
        &storage,
        &admin,
        &app_config.destination,
        &app_config.temporary_path,
    )
    .restore_command(&app_config.restore_command)
    .step_timeout(app_config.command_timeout)
    .verbose(verbose);

    let report = pipeline
        .run(selector, target)
        .await
        .with_context(|| format!("Restore of '{}' into '{}' failed", selector, target))?;
    Ok(report)
}
