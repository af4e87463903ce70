// pgmanager/src/restore/logic.rs
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{error, info, warn};

use super::catalog::BackupCatalog;
use super::db_restore;
use crate::backup::archive;
use crate::database::{ConnectionParams, DatabaseAdmin, scratch_database_name, validate_identifier};
use crate::errors::Result;
use crate::storage::StorageBackend;
use crate::utils::process::ProcessRunner;
use crate::utils::{bounded, discard_scratch_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreState {
    Start,
    Resolved,
    Fetched,
    Extracted,
    Provisioned,
    Restored,
    Swapped,
    Done,
    Failed,
}

impl fmt::Display for RestoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestoreState::Start => "START",
            RestoreState::Resolved => "RESOLVED",
            RestoreState::Fetched => "FETCHED",
            RestoreState::Extracted => "EXTRACTED",
            RestoreState::Provisioned => "PROVISIONED",
            RestoreState::Restored => "RESTORED",
            RestoreState::Swapped => "SWAPPED",
            RestoreState::Done => "DONE",
            RestoreState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// Everything one restore run works on.
#[derive(Debug, Clone)]
pub struct RestoreSession {
    pub requested_date: String,
    pub resolved_entry: Option<String>,
    pub local_fetched_path: PathBuf,
    pub local_extracted_path: PathBuf,
    pub scratch_database: String,
    pub target_database: String,
}

impl RestoreSession {
    pub fn new(requested_date: &str, target_database: &str, scratch_dir: &Path) -> Self {
        let extracted = scratch_dir.join(format!("restore-{}.dump", target_database));
        let mut fetched = extracted.clone().into_os_string();
        fetched.push(archive::COMPRESSED_SUFFIX);
        Self {
            requested_date: requested_date.to_string(),
            resolved_entry: None,
            local_fetched_path: PathBuf::from(fetched),
            local_extracted_path: extracted,
            scratch_database: scratch_database_name(target_database),
            target_database: target_database.to_string(),
        }
    }

    fn discard_local_files(&self) {
        discard_scratch_file(&self.local_fetched_path);
        discard_scratch_file(&self.local_extracted_path);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub target_database: String,
    pub resolved_key: String,
}

/// Restores a stored backup into `{target}_restore`, then swaps it over the
/// target.
///
/// `START -> RESOLVED -> FETCHED -> EXTRACTED -> PROVISIONED -> RESTORED ->
/// SWAPPED -> DONE`. The rename in the swap is the commit point: a failure
/// before it leaves the target database untouched. A failed restore leaves
/// the scratch database in place for inspection. Local scratch files are
/// removed however the run ends.
pub struct RestorePipeline<'a> {
    runner: &'a dyn ProcessRunner,
    storage: &'a dyn StorageBackend,
    admin: &'a dyn DatabaseAdmin,
    params: &'a ConnectionParams,
    scratch_dir: &'a Path,
    restore_command: &'a str,
    step_timeout: Option<Duration>,
    verbose: bool,
    state: RestoreState,
    last_completed: RestoreState,
}

impl<'a> RestorePipeline<'a> {
    /// `params` addresses the destination server; its user owns the scratch
    /// database.
    pub fn new(
        runner: &'a dyn ProcessRunner,
        storage: &'a dyn StorageBackend,
        admin: &'a dyn DatabaseAdmin,
        params: &'a ConnectionParams,
        scratch_dir: &'a Path,
    ) -> Self {
        Self {
            runner,
            storage,
            admin,
            params,
            scratch_dir,
            restore_command: "pg_restore",
            step_timeout: None,
            verbose: false,
            state: RestoreState::Start,
            last_completed: RestoreState::Start,
        }
    }

    pub fn restore_command(mut self, command_line: &'a str) -> Self {
        self.restore_command = command_line;
        self
    }

    pub fn step_timeout(mut self, limit: Option<Duration>) -> Self {
        self.step_timeout = limit;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn state(&self) -> RestoreState {
        self.state
    }

    pub fn last_completed(&self) -> RestoreState {
        self.last_completed
    }

    pub async fn run(&mut self, selector: &str, target_database: &str) -> Result<RestoreReport> {
        let session = RestoreSession::new(selector, target_database, self.scratch_dir);
        let result = self.execute(session.clone()).await;
        session.discard_local_files();

        if let Err(e) = &result {
            error!(state = %self.state, error = %e, "restore failed");
            if self.last_completed == RestoreState::Provisioned {
                warn!(
                    "Scratch database '{}' was left in place for inspection",
                    session.scratch_database
                );
            }
            self.state = RestoreState::Failed;
        }
        result
    }

    fn advance(&mut self, next: RestoreState) {
        info!(from = %self.state, to = %next, "restore state");
        self.state = next;
        self.last_completed = next;
    }

    async fn execute(&mut self, mut session: RestoreSession) -> Result<RestoreReport> {
        validate_identifier(&session.target_database)?;
        validate_identifier(&session.scratch_database)?;
        // owner of the scratch database
        validate_identifier(&self.params.user)?;
        let timeout = self.step_timeout;

        let key = bounded(
            "backup lookup",
            timeout,
            BackupCatalog::new(self.storage).resolve(&session.requested_date),
        )
        .await?;
        session.resolved_entry = Some(key.clone());
        self.advance(RestoreState::Resolved);

        tokio::fs::create_dir_all(self.scratch_dir).await?;
        session.discard_local_files();
        bounded(
            "download",
            timeout,
            self.storage.get(&key, &session.local_fetched_path),
        )
        .await?;
        self.advance(RestoreState::Fetched);

        let extracted = archive::decompress(&session.local_fetched_path)?;
        discard_scratch_file(&session.local_fetched_path);
        self.advance(RestoreState::Extracted);

        let scratch = session.scratch_database.as_str();
        info!("Creating temp database for restore: {}", scratch);
        bounded("scratch database setup", timeout, async {
            self.admin.terminate_connections(scratch).await?;
            self.admin.drop_database(scratch).await?;
            self.admin.create_database(scratch, &self.params.user).await
        })
        .await?;
        self.advance(RestoreState::Provisioned);

        let command = db_restore::restore_command(
            self.restore_command,
            &self.params.with_database(scratch),
            &extracted,
            self.verbose,
        )?;
        info!("Restoring {} into {}", key, scratch);
        bounded(
            "restore",
            timeout,
            db_restore::run_restore(self.runner, &command),
        )
        .await?;
        let tables = bounded("sanity check", timeout, self.admin.table_count(scratch)).await?;
        match tables {
            0 => warn!(
                "No tables found in the public schema of '{}'; the backup may be empty",
                scratch
            ),
            tables => info!("✓ '{}' holds {} public tables", scratch, tables),
        }
        self.advance(RestoreState::Restored);

        let target = session.target_database.as_str();
        info!("Switching restored database with active one: {} > {}", scratch, target);
        bounded("swap", timeout, async {
            self.admin.terminate_connections(target).await?;
            self.admin.drop_database(target).await?;
            self.admin.rename_database(scratch, target).await
        })
        .await?;
        self.advance(RestoreState::Swapped);

        self.advance(RestoreState::Done);
        info!("Database {} restored and active", target);
        Ok(RestoreReport {
            target_database: session.target_database.clone(),
            resolved_key: key,
        })
    }
}
