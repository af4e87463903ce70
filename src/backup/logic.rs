// pgmanager/src/backup/logic.rs
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{error, info};

use super::{archive, db_dump};
use crate::database::ConnectionParams;
use crate::errors::Result;
use crate::storage::StorageBackend;
use crate::utils::process::ProcessRunner;
use crate::utils::{bounded, discard_scratch_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    Start,
    Dumped,
    Compressed,
    Stored,
    Done,
    Failed,
}

impl fmt::Display for BackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupState::Start => "START",
            BackupState::Dumped => "DUMPED",
            BackupState::Compressed => "COMPRESSED",
            BackupState::Stored => "STORED",
            BackupState::Done => "DONE",
            BackupState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// `backup-{YYYYMMDD-HHMMSS}-{database}.dump`
pub fn artifact_file_name(created_at: &NaiveDateTime, database: &str) -> String {
    format!(
        "backup-{}-{}.dump",
        created_at.format("%Y%m%d-%H%M%S"),
        database
    )
}

/// One backup in flight. Both local paths are scratch files.
#[derive(Debug, Clone)]
pub struct BackupArtifact {
    pub source_database: String,
    pub created_at: NaiveDateTime,
    pub local_dump_path: PathBuf,
    pub local_compressed_path: PathBuf,
    pub remote_key: Option<String>,
}

impl BackupArtifact {
    pub fn new(source_database: &str, created_at: NaiveDateTime, scratch_dir: &Path) -> Self {
        let file_name = artifact_file_name(&created_at, source_database);
        let compressed_name = format!("{}{}", file_name, archive::COMPRESSED_SUFFIX);
        Self {
            source_database: source_database.to_string(),
            created_at,
            local_dump_path: scratch_dir.join(file_name),
            local_compressed_path: scratch_dir.join(compressed_name),
            remote_key: None,
        }
    }

    /// Storage key of the compressed artifact.
    pub fn key(&self) -> String {
        format!(
            "{}{}",
            artifact_file_name(&self.created_at, &self.source_database),
            archive::COMPRESSED_SUFFIX
        )
    }

    fn discard_local_files(&self) {
        discard_scratch_file(&self.local_dump_path);
        discard_scratch_file(&self.local_compressed_path);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub database: String,
    pub created_at: NaiveDateTime,
    pub remote_key: String,
}

/// Dump, compress and store one database.
///
/// `START -> DUMPED -> COMPRESSED -> STORED -> DONE`; any failure moves to
/// `FAILED`, removes the local scratch files and returns the original error.
pub struct BackupPipeline<'a> {
    runner: &'a dyn ProcessRunner,
    storage: &'a dyn StorageBackend,
    params: &'a ConnectionParams,
    scratch_dir: &'a Path,
    dump_command: &'a str,
    step_timeout: Option<Duration>,
    verbose: bool,
    state: BackupState,
    last_completed: BackupState,
}

impl<'a> BackupPipeline<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        storage: &'a dyn StorageBackend,
        params: &'a ConnectionParams,
        scratch_dir: &'a Path,
    ) -> Self {
        Self {
            runner,
            storage,
            params,
            scratch_dir,
            dump_command: "pg_dump",
            step_timeout: None,
            verbose: false,
            state: BackupState::Start,
            last_completed: BackupState::Start,
        }
    }

    pub fn dump_command(mut self, command_line: &'a str) -> Self {
        self.dump_command = command_line;
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

    pub fn state(&self) -> BackupState {
        self.state
    }

    /// Last state reached before `FAILED`, or the current state.
    pub fn last_completed(&self) -> BackupState {
        self.last_completed
    }

    pub async fn run(&mut self, created_at: NaiveDateTime) -> Result<BackupReport> {
        let mut artifact = BackupArtifact::new(&self.params.database, created_at, self.scratch_dir);
        info!(
            "Backing up {} via {}",
            self.params.redacted(),
            self.storage.describe()
        );

        match self.execute(&mut artifact).await {
            Ok(report) => Ok(report),
            Err(e) => {
                error!(state = %self.state, error = %e, "backup failed");
                self.state = BackupState::Failed;
                artifact.discard_local_files();
                Err(e)
            }
        }
    }

    fn advance(&mut self, next: BackupState) {
        info!(from = %self.state, to = %next, "backup state");
        self.state = next;
        self.last_completed = next;
    }

    async fn execute(&mut self, artifact: &mut BackupArtifact) -> Result<BackupReport> {
        tokio::fs::create_dir_all(self.scratch_dir).await?;
        artifact.discard_local_files();

        let command = db_dump::dump_command(
            self.dump_command,
            self.params,
            &artifact.local_dump_path,
            self.verbose,
        )?;
        info!("Dumping {} to {}", self.params.database, artifact.local_dump_path.display());
        bounded(
            "dump",
            self.step_timeout,
            db_dump::run_dump(self.runner, &command),
        )
        .await?;
        self.advance(BackupState::Dumped);

        archive::compress(&artifact.local_dump_path)?;
        // the compressed artifact exists, so losing this file only costs disk space
        discard_scratch_file(&artifact.local_dump_path);
        self.advance(BackupState::Compressed);

        let key = artifact.key();
        bounded(
            "upload",
            self.step_timeout,
            self.storage.put(&artifact.local_compressed_path, &key),
        )
        .await?;
        artifact.remote_key = Some(key.clone());
        self.advance(BackupState::Stored);

        // no-op unless the backend left its source file behind
        artifact.discard_local_files();
        self.advance(BackupState::Done);

        Ok(BackupReport {
            database: artifact.source_database.clone(),
            created_at: artifact.created_at,
            remote_key: key,
        })
    }
}
